use {super::*, reqwest::StatusCode, serde::de::DeserializeOwned};

#[derive(Debug, Clone)]
pub struct UpstreamOptions {
    pub url: String,
    pub username: String,
    pub password: String,
    pub timeout: Duration,
}

#[derive(Debug, Deserialize)]
struct RpcResponse {
    #[serde(default)]
    result: Value,
    #[serde(default)]
    error: Option<RpcError>,
    #[serde(default)]
    id: Value,
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct RpcError {
    pub code: i64,
    pub message: String,
}

impl Display for RpcError {
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        write!(f, "{} (code {})", self.message, self.code)
    }
}

impl std::error::Error for RpcError {}

impl RpcResponse {
    fn into_result(self, method: &str) -> Result<Value> {
        match self.error {
            Some(err) => Err(Error::new(err).context(format!("`{method}` failed"))),
            None => Ok(self.result),
        }
    }
}

/// Result of the node's `getkawpowhash`.
#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct KawpowHash {
    pub digest: String,
    #[serde(default)]
    pub mix_hash: Option<String>,
}

/// JSON-RPC client for the coin daemon.
#[derive(Debug)]
pub struct Upstream {
    client: reqwest::Client,
    options: UpstreamOptions,
    next_id: AtomicU64,
}

impl Upstream {
    pub fn new(options: UpstreamOptions) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(options.timeout)
            .user_agent(USER_AGENT)
            .build()
            .context("failed to build RPC client")?;

        Ok(Self {
            client,
            options,
            next_id: AtomicU64::new(0),
        })
    }

    pub fn url(&self) -> &str {
        &self.options.url
    }

    fn next_id(&self) -> u64 {
        self.next_id.fetch_add(1, Ordering::Relaxed)
    }

    async fn post(&self, body: &Value) -> Result<String> {
        let response = self
            .client
            .post(&self.options.url)
            .basic_auth(&self.options.username, Some(&self.options.password))
            .json(body)
            .send()
            .await
            .with_context(|| format!("failed to reach daemon at {}", self.options.url))?;

        ensure!(
            response.status() != StatusCode::UNAUTHORIZED,
            "unauthorized RPC access: invalid RPC username or password"
        );

        response
            .text()
            .await
            .context("failed to read daemon response")
    }

    pub async fn call<T: DeserializeOwned>(&self, method: &str, params: Value) -> Result<T> {
        let body = json!({
            "jsonrpc": "1.0",
            "id": self.next_id(),
            "method": method,
            "params": params,
        });

        let text = self.post(&body).await?;

        let response = parse::<RpcResponse>(&text)
            .with_context(|| format!("invalid response to `{method}`"))?;

        serde_json::from_value(response.into_result(method)?)
            .with_context(|| format!("unexpected result for `{method}`"))
    }

    /// Sends every command in one request. Results come back in command order.
    pub async fn batch(&self, commands: &[(&str, Value)]) -> Result<Vec<Result<Value>>> {
        let first = self.next_id.fetch_add(commands.len() as u64, Ordering::Relaxed);

        let body = Value::Array(
            commands
                .iter()
                .enumerate()
                .map(|(i, (method, params))| {
                    json!({
                        "method": method,
                        "params": params,
                        "id": first + i as u64,
                    })
                })
                .collect(),
        );

        let text = self.post(&body).await?;

        let responses =
            parse::<Vec<RpcResponse>>(&text).context("invalid response to batch request")?;

        order_batch(commands, first, responses)
    }

    pub async fn get_block_template(&self) -> Result<BlockTemplate> {
        self.call(
            "getblocktemplate",
            json!([{
                "capabilities": ["coinbasetxn", "workid", "coinbase/append"],
                "rules": ["segwit"],
            }]),
        )
        .await
    }

    /// Submits a serialized block. The daemon answers `null` on success and a reason string
    /// otherwise.
    pub async fn submit_block(&self, block: &[u8]) -> Result {
        let result: Option<String> = self.call("submitblock", json!([hex::encode(block)])).await?;

        match result {
            None => Ok(()),
            Some(reason) => bail!("daemon rejected block: {reason}"),
        }
    }

    pub async fn is_online(&self) -> bool {
        match self.call::<Value>("getblockchaininfo", json!([])).await {
            Ok(_) => true,
            Err(err) => {
                warn!("Daemon at {} is offline: {err:#}", self.options.url);
                false
            }
        }
    }

    pub async fn get_kawpow_hash(
        &self,
        header_hash: &str,
        mix_hash: &str,
        nonce: &str,
        height: u64,
        target: &str,
    ) -> Result<KawpowHash> {
        self.call(
            "getkawpowhash",
            json!([header_hash, mix_hash, nonce, height, target]),
        )
        .await
    }
}

/// Some daemons emit `-nan` for unknown floating point values.
fn parse<T: DeserializeOwned>(text: &str) -> Result<T> {
    match serde_json::from_str(text) {
        Ok(value) => Ok(value),
        Err(_) if text.contains(":-nan") => serde_json::from_str(&text.replace(":-nan", ":0"))
            .with_context(|| format!("failed to parse `{}`", truncate(text))),
        Err(err) => Err(err).with_context(|| format!("failed to parse `{}`", truncate(text))),
    }
}

fn truncate(text: &str) -> &str {
    match text.char_indices().nth(200) {
        Some((end, _)) => &text[..end],
        None => text,
    }
}

fn order_batch(
    commands: &[(&str, Value)],
    first: u64,
    responses: Vec<RpcResponse>,
) -> Result<Vec<Result<Value>>> {
    let mut results = commands
        .iter()
        .map(|(method, _)| Err(anyhow!("no response to `{method}`")))
        .collect::<Vec<Result<Value>>>();

    for response in responses {
        let index = response
            .id
            .as_u64()
            .and_then(|id| id.checked_sub(first))
            .map(|index| index as usize)
            .filter(|index| *index < commands.len())
            .ok_or_else(|| anyhow!("unexpected id {} in batch response", response.id))?;

        results[index] = response.into_result(commands[index].0);
    }

    Ok(results)
}
