// Make / model / trim catalog from the proxy's trims endpoint.
// The endpoint answers a nested object: make -> model -> trims.

use serde_json::Value;

use crate::error::{KslError, Result};
use crate::gateway::{ProxyApi, TRIMS_ENDPOINT};

/// No make: all makes. Make only: its models. Make and model: its trims.
/// A model without a make is ignored. Names keep the proxy's order.
pub async fn makes_models_trims<A>(api: &A, make: Option<&str>, model: Option<&str>) -> Result<Vec<String>>
where
    A: ProxyApi + ?Sized,
{
    let cars = api.post(TRIMS_ENDPOINT, None).await?;

    let Some(make) = make else {
        return names(&cars, "catalog");
    };
    let models = cars
        .get(make)
        .ok_or_else(|| KslError::NotInCatalog(make.to_string()))?;

    let Some(model) = model else {
        return names(models, make);
    };
    let trims = models
        .get(model)
        .ok_or_else(|| KslError::NotInCatalog(format!("{} {}", make, model)))?;
    names(trims, model)
}

// Keys of an object, or the string elements of an array.
fn names(value: &Value, context: &str) -> Result<Vec<String>> {
    match value {
        Value::Object(map) => Ok(map.keys().cloned().collect()),
        Value::Array(items) => items
            .iter()
            .map(|item| match item {
                Value::String(s) => Ok(s.clone()),
                Value::Number(n) => Ok(n.to_string()),
                other => Err(KslError::MalformedResponse(format!(
                    "unexpected catalog entry under {}: {}",
                    context, other
                ))),
            })
            .collect(),
        other => Err(KslError::MalformedResponse(format!(
            "unexpected catalog shape under {}: {}",
            context, other
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gateway::mock::MockApi;
    use serde_json::json;

    fn cars() -> Value {
        json!({
            "Toyota": { "Corolla": ["LE"] },
            "Honda": { "Civic": ["Si"] },
            "Ford": { "F-150": ["Lariat"] }
        })
    }

    #[tokio::test]
    async fn test_get_makes_models_trims() {
        let api = MockApi::with_data(vec![cars(), cars(), cars()]);
        assert_eq!(
            makes_models_trims(&api, None, None).await.unwrap(),
            vec!["Toyota", "Honda", "Ford"]
        );
        assert_eq!(
            makes_models_trims(&api, Some("Toyota"), None).await.unwrap(),
            vec!["Corolla"]
        );
        assert_eq!(
            makes_models_trims(&api, Some("Toyota"), Some("Corolla")).await.unwrap(),
            vec!["LE"]
        );
        assert_eq!(api.calls.lock().unwrap()[0], (TRIMS_ENDPOINT.to_string(), None));
    }

    #[tokio::test]
    async fn test_unknown_make_or_model() {
        let api = MockApi::with_data(vec![cars(), cars()]);
        let err = makes_models_trims(&api, Some("Yugo"), None).await.unwrap_err();
        assert!(matches!(err, KslError::NotInCatalog(name) if name == "Yugo"));

        let err = makes_models_trims(&api, Some("Ford"), Some("Pinto")).await.unwrap_err();
        assert!(err.is_validation());
    }

    #[tokio::test]
    async fn test_model_without_make_lists_makes() {
        let api = MockApi::with_data(vec![cars()]);
        let makes = makes_models_trims(&api, None, Some("Civic")).await.unwrap();
        assert_eq!(makes.len(), 3);
    }
}
