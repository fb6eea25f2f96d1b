//! Request router: maps wire methods onto [`CostSource`] calls.

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;

use crate::plugin::protocol::{methods, SERVICE};
use crate::plugin::CostSource;
use crate::types::{Error, Result};

/// Route one request to the hosted source and encode its response body.
pub async fn route_request(
    source: &dyn CostSource,
    service: &str,
    method: &str,
    body: Value,
) -> Result<Value> {
    if service != SERVICE {
        return Err(Error::not_found(format!("Unknown service: {}", service)));
    }
    match method {
        methods::GET_PLUGIN_INFO => match source.metadata() {
            Some(meta) => to_body(&meta),
            None => Err(Error::unimplemented(format!(
                "{} does not report metadata",
                source.name()
            ))),
        },
        methods::GET_PROJECTED_COST => to_body(&source.projected_cost(parse_body(body)?).await?),
        methods::GET_ACTUAL_COST => to_body(&source.actual_cost(parse_body(body)?).await?),
        methods::GET_RECOMMENDATIONS => {
            to_body(&source.recommendations(parse_body(body)?).await?)
        }
        methods::DRY_RUN => to_body(&source.dry_run(parse_body(body)?).await?),
        _ => Err(Error::unimplemented(format!("Unknown method: {}", method))),
    }
}

/// Decode a request body. A missing body decodes as the record's defaults.
pub fn parse_body<T: DeserializeOwned>(body: Value) -> Result<T> {
    let body = match body {
        Value::Null => Value::Object(serde_json::Map::new()),
        other => other,
    };
    serde_json::from_value(body).map_err(|e| Error::validation(format!("Invalid request body: {}", e)))
}

fn to_body<T: Serialize>(value: &T) -> Result<Value> {
    Ok(serde_json::to_value(value)?)
}
