use bytes::Bytes;
use serde_json::Value;

use crate::config::{
	BackendConfig, GatewayConfig, HeaderMatch, HeaderMatchType, RouteRule,
};
use crate::*;

#[cfg(test)]
#[path = "router_tests.rs"]
mod tests;

/// Scans rules in declaration order; a rule matches when every header
/// predicate holds.
pub fn select_route<'a>(
	cfg: &'a GatewayConfig,
	headers: &http::HeaderMap,
) -> Option<&'a RouteRule> {
	cfg
		.rules
		.iter()
		.find(|rule| rule.headers.iter().all(|m| header_matches(m, headers)))
}

fn header_matches(m: &HeaderMatch, headers: &http::HeaderMap) -> bool {
	// HeaderMap keys are already case-insensitive; values are not.
	let candidates: Vec<&str> = headers
		.get_all(m.name.as_str())
		.iter()
		.filter_map(|v| v.to_str().ok())
		.collect();
	if candidates.is_empty() {
		return false;
	}
	let mut wanted: Vec<&str> = Vec::new();
	if let Some(v) = &m.value {
		wanted.push(v.as_str());
	}
	if let Some(vs) = &m.values {
		wanted.extend(vs.iter().map(|v| v.as_str()));
	}
	if wanted.is_empty() {
		// A predicate without values asserts presence only
		return true;
	}
	candidates.iter().any(|got| {
		wanted.iter().any(|want| match m.match_type {
			HeaderMatchType::Exact => {
				if m.case_sensitive {
					got == want
				} else {
					got.eq_ignore_ascii_case(want)
				}
			},
			HeaderMatchType::Prefix => {
				if m.case_sensitive {
					got.starts_with(want)
				} else {
					got.to_ascii_lowercase().starts_with(&want.to_ascii_lowercase())
				}
			},
		})
	})
}

/// Picks the backend for the given attempt. The first attempt takes the
/// primary (highest weight, declaration order breaking ties); retries walk
/// the remaining backends in declaration order until the list is exhausted.
pub fn select_backend<'a>(
	rule: &'a RouteRule,
	attempted: &[Strng],
) -> Option<&'a BackendConfig> {
	if attempted.is_empty() {
		let mut best = rule.backends.first()?;
		for b in rule.backends.iter().skip(1) {
			if b.weight > best.weight {
				best = b;
			}
		}
		return Some(best);
	}
	rule
		.backends
		.iter()
		.find(|b| !attempted.iter().any(|a| a == &b.name))
}

/// Applies the backend's configured JSON-path mutations in declaration
/// order: all `set`s, then all `remove`s. `set` creates intermediate
/// objects.
pub fn apply_mutations(body: &mut Value, backend: &BackendConfig) {
	let Some(mutation) = &backend.body_mutation else {
		return;
	};
	for set in &mutation.set {
		json_set(body, set.path.as_str(), set.value.clone());
	}
	for path in &mutation.remove {
		json_remove(body, path.as_str());
	}
}

fn json_set(root: &mut Value, path: &str, value: Value) {
	let mut parts = path.split('.').peekable();
	let mut cur = root;
	while let Some(key) = parts.next() {
		if parts.peek().is_none() {
			if let Value::Object(map) = cur {
				map.insert(key.to_string(), value);
			}
			return;
		}
		if !cur.is_object() {
			return;
		}
		let map = cur.as_object_mut().expect("checked above");
		cur = map
			.entry(key.to_string())
			.or_insert_with(|| Value::Object(Default::default()));
		if !cur.is_object() {
			*cur = Value::Object(Default::default());
		}
	}
}

fn json_remove(root: &mut Value, path: &str) {
	let mut parts: Vec<&str> = path.split('.').collect();
	let last = match parts.pop() {
		Some(l) => l,
		None => return,
	};
	let mut cur = root;
	for key in parts {
		match cur.get_mut(key) {
			Some(next) => cur = next,
			None => return,
		}
	}
	if let Value::Object(map) = cur {
		map.remove(last);
	}
}

/// Extracts the requested model: body `model` field first, then a
/// provider-native path parameter, then the operator-configured header.
pub fn extract_model(
	cfg: &GatewayConfig,
	headers: &http::HeaderMap,
	path: &str,
	body: Option<&Value>,
) -> Option<Strng> {
	if let Some(m) = body
		.and_then(|b| b.get("model"))
		.and_then(|m| m.as_str())
	{
		return Some(strng::new(m));
	}
	if let Some(m) = model_from_path(path) {
		return Some(strng::new(m));
	}
	headers
		.get(cfg.model_name_header.as_str())
		.and_then(|v| v.to_str().ok())
		.map(strng::new)
}

/// Provider-native paths carry the model as `/models/{model}:{op}`.
fn model_from_path(path: &str) -> Option<&str> {
	let (prefix, _op) = path.rsplit_once(':')?;
	let (_, model) = prefix.rsplit_once("/models/")?;
	if model.is_empty() { None } else { Some(model) }
}

/// `GET /v1/models` is answered from the declared catalog without touching a
/// backend; ordering matches declaration order.
pub fn models_response(cfg: &GatewayConfig) -> Bytes {
	#[derive(serde::Serialize)]
	struct Model<'a> {
		id: &'a str,
		object: &'static str,
		created: u64,
		owned_by: &'a str,
	}
	#[derive(serde::Serialize)]
	struct ModelList<'a> {
		object: &'static str,
		data: Vec<Model<'a>>,
	}
	let list = ModelList {
		object: "list",
		data: cfg
			.models
			.iter()
			.map(|m| Model {
				id: m.name.as_str(),
				object: "model",
				created: m.created_at,
				owned_by: m.owned_by.as_str(),
			})
			.collect(),
	};
	Bytes::from(serde_json::to_vec(&list).expect("static shape serializes"))
}
