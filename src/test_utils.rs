use std::{
    env,
    sync::{Mutex, MutexGuard, OnceLock},
};

/// Global lock for environment variable modifications in tests.
/// Tests that touch the process environment should go through [`EnvVarGuard`] so
/// parallel test threads never observe each other's variables.
pub static ENV_LOCK: OnceLock<Mutex<()>> = OnceLock::new();

pub fn env_lock() -> MutexGuard<'static, ()> {
    ENV_LOCK
        .get_or_init(|| Mutex::new(()))
        .lock()
        .unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Sets or clears environment variables for the lifetime of the guard, restoring the
/// previous values on drop.
pub struct EnvVarGuard {
    previous: Vec<(String, Option<String>)>,
    _lock: MutexGuard<'static, ()>,
}

impl EnvVarGuard {
    pub fn set(vars: &[(&str, &str)]) -> Self {
        let lock = env_lock();
        let previous = vars
            .iter()
            .map(|(key, value)| {
                let old = env::var(key).ok();
                unsafe {
                    env::set_var(key, value);
                }
                (key.to_string(), old)
            })
            .collect();
        Self {
            previous,
            _lock: lock,
        }
    }

    pub fn unset(keys: &[&str]) -> Self {
        let lock = env_lock();
        let previous = keys
            .iter()
            .map(|key| {
                let old = env::var(key).ok();
                unsafe {
                    env::remove_var(key);
                }
                (key.to_string(), old)
            })
            .collect();
        Self {
            previous,
            _lock: lock,
        }
    }
}

impl Drop for EnvVarGuard {
    fn drop(&mut self) {
        for (key, value) in self.previous.drain(..).rev() {
            match value {
                Some(value) => unsafe {
                    env::set_var(&key, value);
                },
                None => unsafe {
                    env::remove_var(&key);
                },
            }
        }
    }
}
