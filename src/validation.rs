use crate::error::AppError;

/// Collects field errors so a request reports every problem at once.
#[derive(Debug, Default)]
pub struct Validator {
    errors: Vec<(String, String)>,
}

impl Validator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, path: impl Into<String>, message: impl Into<String>) {
        self.errors.push((path.into(), message.into()));
    }

    /// Returns the trimmed value when it is present and non-blank.
    pub fn required(&mut self, path: &str, value: Option<&str>, message: &str) -> Option<String> {
        match value.map(str::trim).filter(|value| !value.is_empty()) {
            Some(value) => Some(value.to_string()),
            None => {
                self.push(path, message);
                None
            }
        }
    }

    pub fn email(&mut self, path: &str, value: Option<&str>, message: &str) -> Option<String> {
        match value.map(str::trim) {
            Some(value) if is_valid_email(value) => Some(value.to_string()),
            _ => {
                self.push(path, message);
                None
            }
        }
    }

    pub fn one_of(&mut self, path: &str, value: Option<&str>, allowed: &[&str], message: &str) {
        if !value.is_some_and(|value| allowed.contains(&value)) {
            self.push(path, message);
        }
    }

    pub fn max_len(&mut self, path: &str, value: Option<&str>, max: usize) {
        if value.is_some_and(|value| value.chars().count() > max) {
            self.push(path, format!("must be at most {max} characters"));
        }
    }

    pub fn is_empty(&self) -> bool {
        self.errors.is_empty()
    }

    pub fn message(&self) -> String {
        let joined = self
            .errors
            .iter()
            .map(|(path, message)| format!("{path}: {message}"))
            .collect::<Vec<_>>()
            .join(", ");
        format!("Validation error: {joined}")
    }

    pub fn finish(self) -> Result<(), AppError> {
        if self.is_empty() {
            Ok(())
        } else {
            Err(AppError::bad_request(self.message()))
        }
    }
}

/// Loose structural check: one `@`, non-empty local part, dotted domain.
pub fn is_valid_email(value: &str) -> bool {
    let Some((local, domain)) = value.split_once('@') else {
        return false;
    };
    !local.is_empty()
        && !domain.contains('@')
        && !value.chars().any(char::is_whitespace)
        && domain
            .split_once('.')
            .is_some_and(|(host, tld)| !host.is_empty() && !tld.is_empty() && !tld.ends_with('.'))
}
