use anyhow::Result;
use serde::de::DeserializeOwned;
use serde::Serialize;

/// Converts user values to and from the opaque payload bytes carried in
/// tasks, decisions, and events. The worker core never inspects payloads;
/// this seam exists so callers can plug in their own wire format.
pub trait PayloadConverter: Send + Sync {
	fn value_to_payload(&self, value: &serde_json::Value) -> Result<Vec<u8>>;
	fn payload_to_value(&self, payload: &[u8]) -> Result<serde_json::Value>;
}

pub fn to_payload<T: Serialize>(
	converter: &dyn PayloadConverter,
	value: &T,
) -> Result<Vec<u8>> {
	converter.value_to_payload(&serde_json::to_value(value)?)
}

pub fn from_payload<T: DeserializeOwned>(
	converter: &dyn PayloadConverter,
	payload: &[u8],
) -> Result<T> {
	Ok(serde_json::from_value(converter.payload_to_value(payload)?)?)
}

/// Default converter: payloads are JSON.
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonPayloadConverter;

impl PayloadConverter for JsonPayloadConverter {
	fn value_to_payload(&self, value: &serde_json::Value) -> Result<Vec<u8>> {
		Ok(serde_json::to_vec(value)?)
	}

	fn payload_to_value(&self, payload: &[u8]) -> Result<serde_json::Value> {
		Ok(serde_json::from_slice(payload)?)
	}
}
