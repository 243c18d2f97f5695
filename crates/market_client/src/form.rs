use std::future::Future;

use market_core::{validate, ClientError, FormErrors, FormValues, RuleSet};
use market_logging::market_debug;

/// Validates `values` and, only when every field passes, runs `operation`.
///
/// Field errors come back in [`FormErrors::fields`] without `operation` ever
/// being called. A failure of `operation` lands in [`FormErrors::submit`].
pub async fn submit<T, F, Fut>(
    values: &FormValues,
    rules: &RuleSet,
    operation: F,
) -> Result<T, FormErrors>
where
    F: FnOnce() -> Fut,
    Fut: Future<Output = Result<T, ClientError>>,
{
    let fields = validate(values, rules);
    if !fields.is_empty() {
        market_debug!("submit blocked by {} invalid fields", fields.len());
        return Err(FormErrors::from_fields(fields));
    }
    operation()
        .await
        .map_err(|err| FormErrors::from_submit(err.to_string()))
}
