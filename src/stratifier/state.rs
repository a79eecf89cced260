use super::*;

/// Subscription and authorization are independent: a miner may authorize first.
#[derive(Debug, Clone, Default, PartialEq)]
pub(crate) struct State {
    extranonce1: Option<String>,
    username: Option<Username>,
}

impl State {
    pub(crate) fn extranonce1(&self) -> Option<&str> {
        self.extranonce1.as_deref()
    }

    pub(crate) fn is_subscribed(&self) -> bool {
        self.extranonce1.is_some()
    }

    pub(crate) fn is_authorized(&self) -> bool {
        self.username.is_some()
    }

    /// Keeps the first extranonce1. Returns whether this was the first subscribe.
    pub(crate) fn subscribe(&mut self, extranonce1: String) -> bool {
        if self.is_subscribed() {
            return false;
        }

        self.extranonce1 = Some(extranonce1);
        true
    }

    /// A failed authorization drops any earlier one.
    pub(crate) fn authorize(&mut self, username: Option<Username>) {
        self.username = username;
    }

    pub(crate) fn username(&self) -> Option<&Username> {
        self.username.as_ref()
    }
}
