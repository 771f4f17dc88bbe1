use std::{
	env, fs,
	path::PathBuf,
	sync::atomic::{AtomicU64, Ordering},
	time::{SystemTime, UNIX_EPOCH},
};

use toml::Value;

use loci_config::Config;

const SAMPLE_CONFIG_TEMPLATE_TOML: &str = include_str!("fixtures/sample_config.template.toml");

fn sample_toml_with(section: &str, key: &str, value: Value) -> String {
	let mut root: Value =
		toml::from_str(SAMPLE_CONFIG_TEMPLATE_TOML).expect("Failed to parse template config.");
	let mut table = root.as_table_mut().expect("Template config must be a table.");

	for part in section.split('.') {
		table = table
			.get_mut(part)
			.and_then(Value::as_table_mut)
			.unwrap_or_else(|| panic!("Template config must include [{section}]."));
	}

	table.insert(key.to_string(), value);

	toml::to_string(&root).expect("Failed to render template config.")
}

fn write_temp_config(payload: String) -> PathBuf {
	static COUNTER: AtomicU64 = AtomicU64::new(0);

	let nanos = SystemTime::now()
		.duration_since(UNIX_EPOCH)
		.expect("System time must be valid.")
		.as_nanos();
	let ordinal = COUNTER.fetch_add(1, Ordering::SeqCst);
	let pid = std::process::id();
	let mut path = env::temp_dir();

	path.push(format!("loci_config_test_{nanos}_{pid}_{ordinal}.toml"));

	fs::write(&path, payload).expect("Failed to write test config.");

	path
}

fn load_err(payload: String) -> String {
	let path = write_temp_config(payload);
	let result = loci_config::load(&path);

	fs::remove_file(&path).expect("Failed to remove test config.");

	result.expect_err("Expected validation error.").to_string()
}

fn base_config() -> Config {
	toml::from_str(SAMPLE_CONFIG_TEMPLATE_TOML).expect("Failed to parse test config.")
}

#[test]
fn template_config_loads() {
	let path = write_temp_config(SAMPLE_CONFIG_TEMPLATE_TOML.to_string());
	let result = loci_config::load(&path);

	fs::remove_file(&path).expect("Failed to remove test config.");

	let cfg = result.expect("Template config should load.");

	assert_eq!(cfg.search.max_page_size, 50);
	assert_eq!(cfg.search.default_location.lat, 25.0478);
	assert!(cfg.semantic.enabled);
}

#[test]
fn missing_ranking_section_uses_default_weights() {
	let mut root: Value =
		toml::from_str(SAMPLE_CONFIG_TEMPLATE_TOML).expect("Failed to parse template config.");

	root.as_table_mut().expect("Template config must be a table.").remove("ranking");

	let payload = toml::to_string(&root).expect("Failed to render template config.");
	let cfg: Config = toml::from_str(&payload).expect("Failed to parse test config.");

	assert_eq!(cfg.ranking.semantic_weight, 0.6);
	assert_eq!(cfg.ranking.rating_weight, 0.3);
	assert_eq!(cfg.ranking.popularity_weight, 0.1);
	assert_eq!(cfg.ranking.rating_scale, 5.0);
}

#[test]
fn embedding_dimensions_must_match_vector_dim() {
	let message =
		load_err(sample_toml_with("providers.embedding", "dimensions", Value::Integer(768)));

	assert!(
		message.contains("providers.embedding.dimensions must match storage.qdrant.vector_dim."),
		"Unexpected error message: {message}"
	);
}

#[test]
fn default_page_size_cannot_exceed_max() {
	let message = load_err(sample_toml_with("search", "default_page_size", Value::Integer(80)));

	assert!(
		message.contains(
			"search.default_page_size must be less than or equal to search.max_page_size."
		),
		"Unexpected error message: {message}"
	);
}

#[test]
fn candidate_limit_must_be_positive() {
	let message = load_err(sample_toml_with("search", "candidate_limit", Value::Integer(0)));

	assert!(
		message.contains("search.candidate_limit must be greater than zero."),
		"Unexpected error message: {message}"
	);
}

#[test]
fn default_location_must_be_in_range() {
	let message = load_err(sample_toml_with("search.default_location", "lat", Value::Float(123.0)));

	assert!(
		message.contains("search.default_location must be a valid latitude and longitude."),
		"Unexpected error message: {message}"
	);
}

#[test]
fn semantic_timeout_must_be_positive() {
	let message = load_err(sample_toml_with("semantic", "timeout_ms", Value::Integer(0)));

	assert!(
		message.contains("semantic.timeout_ms must be greater than zero."),
		"Unexpected error message: {message}"
	);
}

#[test]
fn ranking_weights_must_be_non_negative() {
	let mut cfg = base_config();

	cfg.ranking.rating_weight = -0.1;

	let err = loci_config::validate(&cfg).expect_err("Expected ranking validation error.");

	assert!(
		err.to_string().contains("ranking.rating_weight must be zero or greater."),
		"Unexpected error: {err}"
	);
}

#[test]
fn ranking_weights_must_be_finite() {
	let mut cfg = base_config();

	cfg.ranking.semantic_weight = f32::NAN;

	let err = loci_config::validate(&cfg).expect_err("Expected ranking validation error.");

	assert!(
		err.to_string().contains("ranking.semantic_weight must be a finite number."),
		"Unexpected error: {err}"
	);
}

#[test]
fn embedding_api_key_required_when_semantic_enabled() {
	let mut cfg = base_config();

	cfg.providers.embedding.api_key = "  ".to_string();

	assert!(loci_config::validate(&cfg).is_err());

	cfg.semantic.enabled = false;

	assert!(loci_config::validate(&cfg).is_ok());
}

#[test]
fn score_threshold_must_be_a_fraction() {
	let mut cfg = base_config();

	cfg.semantic.score_threshold = Some(1.5);

	let err = loci_config::validate(&cfg).expect_err("Expected threshold validation error.");

	assert!(
		err.to_string().contains("semantic.score_threshold must be in the range 0.0-1.0."),
		"Unexpected error: {err}"
	);
}
