use super::*;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct BanningOptions {
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Seconds an address stays banned.
    pub time: u64,
    pub invalid_percent: f64,
    /// Submits counted before the invalid ratio is checked.
    pub check_threshold: u32,
    /// Seconds between sweeps of expired bans.
    pub purge_interval: u64,
}

fn default_true() -> bool {
    true
}

impl Default for BanningOptions {
    fn default() -> Self {
        Self {
            enabled: true,
            time: 600,
            invalid_percent: 50.0,
            check_threshold: 500,
            purge_interval: 300,
        }
    }
}

impl BanningOptions {
    pub fn duration(&self) -> Duration {
        Duration::from_secs(self.time)
    }

    pub fn purge_interval(&self) -> Duration {
        Duration::from_secs(self.purge_interval.max(1))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BanCheck {
    Clear,
    Kicked { remaining: Duration },
    Forgiven,
}

/// Banned addresses and when they were banned.
#[derive(Debug)]
pub struct BanList {
    duration: Duration,
    banned: Mutex<HashMap<IpAddr, Instant>>,
}

impl BanList {
    pub fn new(duration: Duration) -> Self {
        Self {
            duration,
            banned: Mutex::new(HashMap::new()),
        }
    }

    pub fn ban(&self, ip: IpAddr, now: Instant) {
        self.banned.lock().insert(ip, now);
    }

    /// Looks up `ip`, dropping its record if the ban has run out.
    pub fn check(&self, ip: IpAddr, now: Instant) -> BanCheck {
        let mut banned = self.banned.lock();

        let Some(banned_at) = banned.get(&ip).copied() else {
            return BanCheck::Clear;
        };

        let elapsed = now.saturating_duration_since(banned_at);

        if elapsed < self.duration {
            BanCheck::Kicked {
                remaining: self.duration - elapsed,
            }
        } else {
            banned.remove(&ip);
            BanCheck::Forgiven
        }
    }

    /// Removes expired bans, returning how many were dropped.
    pub fn purge(&self, now: Instant) -> usize {
        let mut banned = self.banned.lock();
        let before = banned.len();
        banned.retain(|_, banned_at| now.saturating_duration_since(*banned_at) < self.duration);
        before - banned.len()
    }

    pub fn len(&self) -> usize {
        self.banned.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
