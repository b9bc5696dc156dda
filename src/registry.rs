use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};
use crate::error::{Error, Result};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Registration {
    Created,
    Duplicate,
}

/// Credential store shared by every connection. Each call must be atomic
/// with respect to every other call.
pub trait UserStore: Send + Sync {
    /// Inserts the user unless the name is already taken.
    fn register(&self, username: &str, password: &str) -> Result<Registration>;

    /// Whether a user with exactly this password exists.
    fn verify(&self, username: &str, password: &str) -> Result<bool>;
}

/// Process-lifetime store behind a single lock.
#[derive(Debug, Default)]
pub struct MemoryUserStore {
    users: Mutex<HashMap<String, String>>,
}

impl MemoryUserStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> Result<usize> {
        Ok(self.lock()?.len())
    }

    pub fn is_empty(&self) -> Result<bool> {
        Ok(self.lock()?.is_empty())
    }

    fn lock(&self) -> Result<MutexGuard<'_, HashMap<String, String>>> {
        self.users.lock().map_err(|_| Error::Registry("user table lock poisoned".to_string()))
    }
}

impl UserStore for MemoryUserStore {
    fn register(&self, username: &str, password: &str) -> Result<Registration> {
        let mut users = self.lock()?;
        if users.contains_key(username) {
            return Ok(Registration::Duplicate);
        }

        users.insert(username.to_string(), password.to_string());
        Ok(Registration::Created)
    }

    fn verify(&self, username: &str, password: &str) -> Result<bool> {
        let users = self.lock()?;
        Ok(users.get(username).map_or(false, |stored| stored == password))
    }
}
