use parking_lot::RwLock;

use crate::debug;
use crate::reply::LoginGate;

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum SessionError {
    #[error("not logged in")]
    NotLoggedIn,
    #[error("username is required")]
    MissingUsername,
    #[error("token is empty")]
    EmptyToken,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Account {
    pub username: String,
    pub jwt: String,
}

impl Account {
    pub fn new(username: &str, jwt: &str) -> Result<Self, SessionError> {
        let username = username.trim();
        if username.is_empty() {
            return Err(SessionError::MissingUsername);
        }
        if jwt.trim().is_empty() {
            return Err(SessionError::EmptyToken);
        }
        Ok(Self {
            username: username.to_string(),
            jwt: jwt.trim().to_string(),
        })
    }
}

/// Holds the logged-in account. Doubles as the reply flow's login gate: with
/// no account it flags a login prompt for the UI and tells the caller to stop.
#[derive(Debug, Default)]
pub struct Manager {
    active: RwLock<Option<Account>>,
    prompt_requested: RwLock<bool>,
}

impl Manager {
    pub fn new(initial: Option<Account>) -> Self {
        Self {
            active: RwLock::new(initial),
            prompt_requested: RwLock::new(false),
        }
    }

    pub fn active(&self) -> Option<Account> {
        self.active.read().clone()
    }

    pub fn is_logged_in(&self) -> bool {
        self.active.read().is_some()
    }

    pub fn active_jwt(&self) -> Result<String, SessionError> {
        self.active
            .read()
            .as_ref()
            .map(|account| account.jwt.clone())
            .ok_or(SessionError::NotLoggedIn)
    }

    pub fn complete_login(&self, account: Account) {
        debug::log(format!("session: logged in as {}", account.username));
        *self.active.write() = Some(account);
        *self.prompt_requested.write() = false;
    }

    pub fn logout(&self) {
        *self.active.write() = None;
    }

    pub fn request_prompt(&self) {
        *self.prompt_requested.write() = true;
    }

    /// Returns and clears a pending login prompt request.
    pub fn take_prompt_request(&self) -> bool {
        std::mem::take(&mut *self.prompt_requested.write())
    }
}

impl LoginGate for Manager {
    fn present_login_if_needed(&self) -> bool {
        if self.is_logged_in() {
            return false;
        }
        self.request_prompt();
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn gate_requests_prompt_when_logged_out() {
        let manager = Manager::new(None);
        assert!(manager.present_login_if_needed());
        assert!(manager.take_prompt_request());
        assert!(!manager.take_prompt_request());
        assert_eq!(manager.active_jwt(), Err(SessionError::NotLoggedIn));
    }

    #[test]
    fn gate_passes_when_logged_in() {
        let manager = Manager::new(None);
        manager.request_prompt();
        manager.complete_login(Account::new("alice", "token").unwrap());
        assert!(!manager.present_login_if_needed());
        assert!(!manager.take_prompt_request());
        assert_eq!(manager.active_jwt().unwrap(), "token");

        manager.logout();
        assert!(!manager.is_logged_in());
    }

    #[test]
    fn account_validation() {
        assert_eq!(Account::new(" ", "t"), Err(SessionError::MissingUsername));
        assert_eq!(Account::new("bob", ""), Err(SessionError::EmptyToken));
    }
}
