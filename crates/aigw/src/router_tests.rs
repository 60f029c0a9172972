use serde_json::{Value, json};

use super::*;
use crate::config::GatewayConfig;

fn test_config() -> GatewayConfig {
	GatewayConfig::from_yaml(
		r#"
schema: OpenAI
models:
- name: gpt-4o
  ownedBy: openai
  createdAt: 1700000000
- name: claude-sonnet-4
  ownedBy: anthropic
rules:
- name: gpt
  headers:
  - name: x-ai-eg-model
    value: gpt-4o
  backends:
  - name: openai-primary
    schema: OpenAI
    weight: 10
  - name: openai-fallback
    schema: OpenAI
- name: claude
  headers:
  - name: x-ai-eg-model
    values: [claude-sonnet-4, claude-haiku-4]
  backends:
  - name: anthropic
    schema: Anthropic
    auth:
      anthropic:
        key: sk-test
- name: catchall
  backends:
  - name: default
    schema: OpenAI
"#,
	)
	.expect("valid config")
}

fn headers(pairs: &[(&str, &str)]) -> http::HeaderMap {
	let mut h = http::HeaderMap::new();
	for (k, v) in pairs {
		h.append(
			http::header::HeaderName::try_from(*k).unwrap(),
			http::HeaderValue::from_str(v).unwrap(),
		);
	}
	h
}

#[test]
fn rules_scan_in_declaration_order() {
	let cfg = test_config();
	let rule = select_route(&cfg, &headers(&[("x-ai-eg-model", "gpt-4o")])).unwrap();
	assert_eq!(rule.name.as_str(), "gpt");
	let rule = select_route(&cfg, &headers(&[("x-ai-eg-model", "claude-haiku-4")])).unwrap();
	assert_eq!(rule.name.as_str(), "claude");
	// Nothing matches the first two rules: the unconditioned rule wins
	let rule = select_route(&cfg, &headers(&[("x-ai-eg-model", "unknown")])).unwrap();
	assert_eq!(rule.name.as_str(), "catchall");
}

#[test]
fn header_keys_are_case_insensitive_values_are_not() {
	let cfg = test_config();
	let rule = select_route(&cfg, &headers(&[("X-AI-EG-MODEL", "gpt-4o")])).unwrap();
	assert_eq!(rule.name.as_str(), "gpt");
	let rule = select_route(&cfg, &headers(&[("x-ai-eg-model", "GPT-4O")])).unwrap();
	assert_eq!(rule.name.as_str(), "catchall");
}

#[test]
fn backend_selection_walks_fallbacks() {
	let cfg = test_config();
	let rule = &cfg.rules[0];
	// Primary is the heaviest backend
	let first = select_backend(rule, &[]).unwrap();
	assert_eq!(first.name.as_str(), "openai-primary");
	let second = select_backend(rule, &[strng::literal!("openai-primary")]).unwrap();
	assert_eq!(second.name.as_str(), "openai-fallback");
	assert!(
		select_backend(
			rule,
			&[
				strng::literal!("openai-primary"),
				strng::literal!("openai-fallback")
			]
		)
		.is_none(),
		"exhausted list yields nothing"
	);
}

#[test]
fn mutations_apply_in_order() {
	let mut backend = crate::llm::tests::openai_backend();
	backend.body_mutation = Some(crate::config::BodyMutationConfig {
		set: vec![
			crate::config::JsonPathSet {
				path: strng::literal!("generation.settings.temperature"),
				value: json!(0.1),
			},
			crate::config::JsonPathSet {
				path: strng::literal!("user"),
				value: json!("gateway"),
			},
		],
		remove: vec![strng::literal!("metadata.trace"), strng::literal!("seed")],
	});
	let mut body = json!({
		"model": "gpt-4o",
		"seed": 42,
		"metadata": {"trace": "abc", "keep": true},
	});
	apply_mutations(&mut body, &backend);
	assert_eq!(
		body,
		json!({
			"model": "gpt-4o",
			"metadata": {"keep": true},
			"generation": {"settings": {"temperature": 0.1}},
			"user": "gateway",
		})
	);
}

#[test]
fn model_extraction_order() {
	let cfg = test_config();
	// Body wins
	let m = extract_model(
		&cfg,
		&headers(&[("x-ai-eg-model", "header-model")]),
		"/v1/chat/completions",
		Some(&json!({"model": "body-model"})),
	)
	.unwrap();
	assert_eq!(m.as_str(), "body-model");
	// Then provider-native path parameter
	let m = extract_model(
		&cfg,
		&headers(&[]),
		"/v1/projects/p/locations/l/publishers/google/models/gemini-2.0-flash:generateContent",
		Some(&json!({})),
	)
	.unwrap();
	assert_eq!(m.as_str(), "gemini-2.0-flash");
	// Then the configured header
	let m = extract_model(
		&cfg,
		&headers(&[("x-ai-eg-model", "header-model")]),
		"/v1/chat/completions",
		Some(&json!({})),
	)
	.unwrap();
	assert_eq!(m.as_str(), "header-model");
	assert!(extract_model(&cfg, &headers(&[]), "/v1/chat/completions", None).is_none());
}

#[test]
fn models_endpoint_renders_catalog_in_declared_order() {
	let cfg = test_config();
	let body = models_response(&cfg);
	let got: Value = serde_json::from_slice(&body).unwrap();
	assert_eq!(
		got,
		json!({
			"object": "list",
			"data": [
				{"id": "gpt-4o", "object": "model", "created": 1700000000, "owned_by": "openai"},
				{"id": "claude-sonnet-4", "object": "model", "created": 0, "owned_by": "anthropic"},
			],
		})
	);
}

#[test]
fn invalid_configs_are_rejected() {
	use crate::config::ConfigError;
	// No rules
	let err = GatewayConfig::from_yaml("rules: []").unwrap_err();
	assert!(matches!(err, ConfigError::NoRules));
	// Rule without backends
	let err = GatewayConfig::from_yaml("rules:\n- name: r\n  backends: []\n").unwrap_err();
	assert!(matches!(err, ConfigError::NoBackends(_)));
	// Duplicate backend names
	let err = GatewayConfig::from_yaml(
		"rules:\n- name: r\n  backends:\n  - name: b\n    schema: OpenAI\n  - name: b\n    schema: OpenAI\n",
	)
	.unwrap_err();
	assert!(matches!(err, ConfigError::DuplicateBackend(_)));
	// Auth kind not matching the schema
	let err = GatewayConfig::from_yaml(
		"rules:\n- name: r\n  backends:\n  - name: b\n    schema: AWSBedrock\n",
	)
	.unwrap_err();
	assert!(matches!(err, ConfigError::InvalidBackend(..)));
}
