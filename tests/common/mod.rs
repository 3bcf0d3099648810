#![allow(dead_code)]

use std::{
    sync::{Arc, Mutex},
    thread,
    time::Duration,
};

use courier::{remote_interface, Remote, RemoteError};
use serde::{Deserialize, Serialize};

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter("courier=warn")
        .with_test_writer()
        .try_init();
}

#[remote_interface]
pub trait Callback {
    fn execute(&self, value: String) -> Result<(), RemoteError>;
}

#[remote_interface]
pub trait Service {
    fn hello(&self) -> Result<String, RemoteError>;
    fn world(&self, callback: Arc<dyn Callback>) -> Result<(), RemoteError>;
    fn echo(&self, token: u64) -> Result<u64, RemoteError>;
    fn sleep(&self, millis: u64) -> Result<(), RemoteError>;
    fn crash(&self) -> Result<(), RemoteError>;
}

#[derive(Default, Remote)]
pub struct Recorder {
    values: Mutex<Vec<String>>,
}

impl Recorder {
    pub fn values(&self) -> Vec<String> {
        self.values.lock().unwrap().clone()
    }
}

impl Callback for Recorder {
    fn execute(&self, value: String) -> Result<(), RemoteError> {
        self.values.lock().unwrap().push(value);
        Ok(())
    }
}

/// Answers `hello` with its greeting, so proxies can tell services apart.
#[derive(Remote)]
pub struct TestService {
    pub greeting: String,
}

impl TestService {
    pub fn new(greeting: &str) -> Self {
        TestService {
            greeting: greeting.to_string(),
        }
    }
}

impl Service for TestService {
    fn hello(&self) -> Result<String, RemoteError> {
        Ok(self.greeting.clone())
    }

    fn world(&self, callback: Arc<dyn Callback>) -> Result<(), RemoteError> {
        callback.execute("world".to_string())
    }

    fn echo(&self, token: u64) -> Result<u64, RemoteError> {
        Ok(token)
    }

    fn sleep(&self, millis: u64) -> Result<(), RemoteError> {
        thread::sleep(Duration::from_millis(millis));
        Ok(())
    }

    fn crash(&self) -> Result<(), RemoteError> {
        panic!("service crashed");
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize, thiserror::Error)]
pub enum AccountError {
    #[error("insufficient funds: {available} available")]
    InsufficientFunds { available: u64 },
    #[error(transparent)]
    Remote(#[from] RemoteError),
}

#[remote_interface]
pub trait Account {
    fn withdraw(&self, amount: u64) -> Result<u64, AccountError>;
    fn owners(&self) -> Result<Vec<String>, AccountError>;
    fn watch(&self, watchers: Vec<Arc<dyn Callback>>) -> Result<usize, AccountError>;
    fn first_watcher(&self) -> Result<Option<Arc<dyn Callback>>, AccountError>;
}

#[derive(Remote)]
pub struct Wallet {
    pub balance: Mutex<u64>,
    pub watchers: Mutex<Vec<Arc<dyn Callback>>>,
}

impl Wallet {
    pub fn new(balance: u64) -> Self {
        Wallet {
            balance: Mutex::new(balance),
            watchers: Mutex::new(Vec::new()),
        }
    }
}

impl Account for Wallet {
    fn withdraw(&self, amount: u64) -> Result<u64, AccountError> {
        let mut balance = self.balance.lock().unwrap();
        if amount > *balance {
            return Err(AccountError::InsufficientFunds {
                available: *balance,
            });
        }
        *balance -= amount;
        for watcher in self.watchers.lock().unwrap().iter() {
            watcher.execute(format!("withdrew {amount}"))?;
        }
        Ok(*balance)
    }

    fn owners(&self) -> Result<Vec<String>, AccountError> {
        Ok(vec!["ada".to_string(), "grace".to_string()])
    }

    fn watch(&self, watchers: Vec<Arc<dyn Callback>>) -> Result<usize, AccountError> {
        let mut current = self.watchers.lock().unwrap();
        current.extend(watchers);
        Ok(current.len())
    }

    fn first_watcher(&self) -> Result<Option<Arc<dyn Callback>>, AccountError> {
        Ok(self.watchers.lock().unwrap().first().cloned())
    }
}
