use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use crate::ClientError;

/// Field name to current value.
pub type FormValues = BTreeMap<String, String>;

/// Field name to the message of its first failing rule.
pub type FieldErrors = BTreeMap<String, String>;

type Predicate = Arc<dyn Fn(&str) -> bool + Send + Sync>;

/// A named predicate over a field value. The predicate returns `true` when the
/// value is acceptable.
#[derive(Clone)]
pub struct Rule {
    message: String,
    predicate: Predicate,
}

impl fmt::Debug for Rule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Rule").field("message", &self.message).finish()
    }
}

impl Rule {
    pub fn custom(
        message: impl Into<String>,
        predicate: impl Fn(&str) -> bool + Send + Sync + 'static,
    ) -> Self {
        Self {
            message: message.into(),
            predicate: Arc::new(predicate),
        }
    }

    pub fn required() -> Self {
        Self::custom("This field is required", |value| !value.trim().is_empty())
    }

    pub fn min_length(min: usize) -> Self {
        Self::custom(format!("Must be at least {min} characters"), move |value| {
            value.chars().count() >= min
        })
    }

    pub fn max_length(max: usize) -> Self {
        Self::custom(format!("Must be at most {max} characters"), move |value| {
            value.chars().count() <= max
        })
    }

    pub fn email() -> Self {
        Self::custom("Enter a valid email address", is_email)
    }

    pub fn numeric() -> Self {
        Self::custom("Must be a number", |value| {
            value.trim().parse::<f64>().is_ok_and(f64::is_finite)
        })
    }

    pub fn min_value(min: f64) -> Self {
        Self::custom(format!("Must be at least {min}"), move |value| {
            value.trim().parse::<f64>().is_ok_and(|number| number >= min)
        })
    }

    /// Replaces the default message.
    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = message.into();
        self
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    /// Returns the rule's message when `value` fails it.
    pub fn check(&self, value: &str) -> Option<&str> {
        if (self.predicate)(value) {
            None
        } else {
            Some(&self.message)
        }
    }
}

fn is_email(value: &str) -> bool {
    let value = value.trim();
    let Some((local, domain)) = value.split_once('@') else {
        return false;
    };
    !local.is_empty()
        && !domain.contains('@')
        && !value.contains(char::is_whitespace)
        && domain
            .split_once('.')
            .is_some_and(|(host, tld)| !host.is_empty() && !tld.is_empty() && !tld.ends_with('.'))
}

/// Ordered rules per field.
#[derive(Debug, Clone, Default)]
pub struct RuleSet {
    fields: BTreeMap<String, Vec<Rule>>,
}

impl RuleSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn field(mut self, name: impl Into<String>, rules: Vec<Rule>) -> Self {
        self.fields.insert(name.into(), rules);
        self
    }

    pub fn fields(&self) -> impl Iterator<Item = (&str, &[Rule])> {
        self.fields
            .iter()
            .map(|(name, rules)| (name.as_str(), rules.as_slice()))
    }
}

/// Validates every field with rules. The first failing rule of a field wins;
/// fields are independent. A missing value validates as empty.
pub fn validate(values: &FormValues, rules: &RuleSet) -> FieldErrors {
    rules
        .fields()
        .filter_map(|(field, rules)| {
            let value = values.get(field).map(String::as_str).unwrap_or("");
            rules
                .iter()
                .find_map(|rule| rule.check(value))
                .map(|message| (field.to_string(), message.to_string()))
        })
        .collect()
}

/// Errors of a submit attempt: field-level errors and the reserved slot for
/// failures of the operation itself.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FormErrors {
    pub fields: FieldErrors,
    pub submit: Option<String>,
}

impl FormErrors {
    pub fn from_fields(fields: FieldErrors) -> Self {
        Self {
            fields,
            submit: None,
        }
    }

    pub fn from_submit(message: impl Into<String>) -> Self {
        Self {
            fields: FieldErrors::new(),
            submit: Some(message.into()),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty() && self.submit.is_none()
    }

    pub fn field(&self, name: &str) -> Option<&str> {
        self.fields.get(name).map(String::as_str)
    }

    /// Field errors as `ClientError::Validation`, in field order.
    pub fn validation_errors(&self) -> Vec<ClientError> {
        self.fields
            .iter()
            .map(|(field, message)| ClientError::Validation {
                field: field.clone(),
                message: message.clone(),
            })
            .collect()
    }
}
