use super::*;

const DEFAULT_WORKER: &str = "noname";

/// A miner login of the form `account.worker`, reduced to `[A-Za-z0-9._]`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Username {
    account: String,
    worker: String,
}

impl Username {
    pub fn new(raw: &str) -> Self {
        let sanitized = raw
            .chars()
            .filter(|c| c.is_ascii_alphanumeric() || *c == '.' || *c == '_')
            .collect::<String>();

        let (account, worker) = match sanitized.split_once('.') {
            Some((account, worker)) if !worker.is_empty() => (account, worker),
            Some((account, _)) => (account, DEFAULT_WORKER),
            None => (sanitized.as_str(), DEFAULT_WORKER),
        };

        Self {
            account: account.into(),
            worker: worker.into(),
        }
    }

    pub fn account(&self) -> &str {
        &self.account
    }

    pub fn worker(&self) -> &str {
        &self.worker
    }
}

impl fmt::Display for Username {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.account, self.worker)
    }
}

impl From<&str> for Username {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[track_caller]
    fn case(raw: &str, account: &str, worker: &str) {
        let username = Username::new(raw);
        assert_eq!(username.account(), account);
        assert_eq!(username.worker(), worker);
    }

    #[test]
    fn account_only() {
        case("RKhd1ehmRfYUnh5mhr5ku5LcCoHx9gyMLB", "RKhd1ehmRfYUnh5mhr5ku5LcCoHx9gyMLB", "noname");
    }

    #[test]
    fn account_and_worker() {
        case("RKhd1ehmRfYUnh5mhr5ku5LcCoHx9gyMLB.rig_1", "RKhd1ehmRfYUnh5mhr5ku5LcCoHx9gyMLB", "rig_1");
    }

    #[test]
    fn splits_on_first_dot() {
        case("acct.rig.two", "acct", "rig.two");
    }

    #[test]
    fn strips_disallowed_characters() {
        case("\"ac-ct\".w<or>k er", "acct", "worker");
    }

    #[test]
    fn trailing_dot() {
        case("acct.", "acct", "noname");
    }

    #[test]
    fn display() {
        assert_eq!(Username::new("acct.rig").to_string(), "acct.rig");
        assert_eq!(Username::new("acct").to_string(), "acct.noname");
    }
}
