//! Redacting wrapper for passwords and tokens

use std::fmt;
use zeroize::Zeroize;

/// Sensitive value. Prints as `[REDACTED]` and is wiped on drop.
pub struct Secret<T: Zeroize>(T);

impl<T: Zeroize> Secret<T> {
    pub fn new(value: T) -> Self {
        Self(value)
    }

    /// Borrow the inner value. Keep the borrow short and never log it.
    pub fn expose(&self) -> &T {
        &self.0
    }
}

impl<T: Zeroize> From<T> for Secret<T> {
    fn from(value: T) -> Self {
        Self(value)
    }
}

impl<T: Zeroize> fmt::Debug for Secret<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("[REDACTED]")
    }
}

impl<T: Zeroize> fmt::Display for Secret<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("[REDACTED]")
    }
}

impl<T: Zeroize> Drop for Secret<T> {
    fn drop(&mut self) {
        self.0.zeroize();
    }
}

impl<T: Zeroize + Clone> Clone for Secret<T> {
    fn clone(&self) -> Self {
        Self(self.0.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn password_is_redacted_in_debug_and_display() {
        let password = Secret::new(String::from("hunter2"));
        assert_eq!(format!("{password:?}"), "[REDACTED]");
        assert_eq!(password.to_string(), "[REDACTED]");
    }

    #[test]
    fn redacted_inside_structs() {
        #[derive(Debug)]
        #[allow(dead_code)]
        struct Login {
            username: String,
            password: Secret<String>,
        }
        let login = Login {
            username: "admin".into(),
            password: "hunter2".to_string().into(),
        };
        let debug = format!("{login:?}");
        assert!(debug.contains("admin"));
        assert!(!debug.contains("hunter2"), "got: {debug}");
    }

    #[test]
    fn expose_returns_value() {
        let token = Secret::new(String::from("rt_1"));
        assert_eq!(token.expose(), "rt_1");
        assert_eq!(token.clone().expose(), "rt_1");
    }
}
