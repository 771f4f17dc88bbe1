//! Turns a raw search request into a validated [`QueryPlan`].

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::{
	Error, Result,
	catalog::{Field, FieldRef, Join, PLACE_ID_COLUMN, PLACE_LAT_COLUMN, PLACE_LNG_COLUMN},
	compile::BoundParams,
	condition::Condition,
	geo::{self, Coordinate, DistanceExpr},
	scan::{self, SemanticScan},
};

pub const DISTANCE_ALIAS: &str = "distance";
pub const PHOTOS_FIELD: &str = "photos";

#[derive(Clone, Debug, Default, Deserialize, Serialize)]
pub struct SearchRequest {
	#[serde(default)]
	pub session_id: Option<String>,
	#[serde(default)]
	pub main_intent: Option<String>,
	#[serde(default)]
	pub info_needed: Vec<String>,
	#[serde(default)]
	pub sort_conditions: Vec<SortCondition>,
	#[serde(default)]
	pub page: Option<i64>,
	#[serde(default)]
	pub page_size: Option<i64>,
	#[serde(default)]
	pub user_location: Option<UserLocation>,
	#[serde(default)]
	pub logic_tree: Value,
}

#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct SortCondition {
	pub field: String,
	#[serde(default)]
	pub method: Option<String>,
}

/// Coordinates arrive as numbers or numeric strings and are parsed during planning.
#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct UserLocation {
	#[serde(default)]
	pub lat: Value,
	#[serde(default)]
	pub lng: Value,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Intent {
	Query,
	Recommend,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Direction {
	Asc,
	Desc,
}
impl Direction {
	pub fn as_sql(self) -> &'static str {
		match self {
			Self::Asc => "ASC",
			Self::Desc => "DESC",
		}
	}
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SortKey {
	Distance,
	Field(Field),
}
impl SortKey {
	pub fn expression(self) -> &'static str {
		match self {
			Self::Distance => DISTANCE_ALIAS,
			Self::Field(field) => field.spec().sort_column().unwrap_or(PLACE_ID_COLUMN),
		}
	}
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub struct SortClause {
	pub key: SortKey,
	pub direction: Direction,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct SelectedField {
	pub alias: String,
	pub expression: String,
	#[serde(skip)]
	pub join: Option<Join>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub struct Pagination {
	pub page: u32,
	pub page_size: u32,
}
impl Pagination {
	pub fn offset(&self) -> u64 {
		u64::from(self.page.saturating_sub(1)) * u64::from(self.page_size)
	}
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LocationSource {
	User,
	Default,
	None,
}

#[derive(Clone, Debug, PartialEq)]
pub struct DistanceRequirement {
	pub source: LocationSource,
	pub origin: Option<Coordinate>,
	/// Present whenever a distance column must be selected.
	pub expression: Option<DistanceExpr>,
}
impl DistanceRequirement {
	pub fn inactive() -> Self {
		Self { source: LocationSource::None, origin: None, expression: None }
	}

	pub fn is_active(&self) -> bool {
		self.expression.is_some()
	}

	pub fn failure(&self) -> Option<&str> {
		self.expression.as_ref().and_then(|expr| expr.failure.as_deref())
	}
}

/// Diagnostics written back by the assembler each time it builds a query from the plan.
#[derive(Clone, Debug, Default, Serialize)]
pub struct PlanArtifacts {
	pub compiled_filter: Option<String>,
	pub bound_parameters: BoundParams,
	/// Names of leaves the compiler could not lower.
	pub dropped_leaves: Vec<String>,
}

#[derive(Clone, Debug)]
pub struct QueryPlan {
	pub session_id: String,
	pub intent: Intent,
	pub selected_fields: Vec<SelectedField>,
	pub sort_clauses: Vec<SortClause>,
	pub pagination: Pagination,
	pub distance: DistanceRequirement,
	pub semantic: SemanticScan,
	pub photos_needed: bool,
	/// The request tree exactly as received.
	pub raw_tree: Value,
	pub tree: Option<Condition>,
	/// Relational rows fetched for semantic re-ranking.
	pub candidate_limit: u32,
	/// Requested output or sort fields that were ignored.
	pub ignored_fields: Vec<String>,
	pub artifacts: PlanArtifacts,
}
impl QueryPlan {
	/// Returns `(limit, offset)` for the relational query.
	///
	/// Semantic plans fetch the whole candidate window so ranking sees every relational match.
	pub fn relational_window(&self) -> (u64, u64) {
		if self.semantic.needed {
			(u64::from(self.candidate_limit), 0)
		} else {
			self.page_window()
		}
	}

	/// Returns `(limit, offset)` of the requested page over the relational result set.
	pub fn page_window(&self) -> (u64, u64) {
		(u64::from(self.pagination.page_size), self.pagination.offset())
	}

	pub fn joins(&self) -> impl Iterator<Item = Join> + '_ {
		self.selected_fields.iter().filter_map(|field| field.join)
	}
}

#[derive(Clone, Copy, Debug)]
pub struct PlannerSettings {
	pub default_page_size: u32,
	pub max_page_size: u32,
	pub candidate_limit: u32,
	pub default_location: Coordinate,
}
impl From<&loci_config::Search> for PlannerSettings {
	fn from(cfg: &loci_config::Search) -> Self {
		Self {
			default_page_size: cfg.default_page_size,
			max_page_size: cfg.max_page_size,
			candidate_limit: cfg.candidate_limit,
			default_location: Coordinate {
				lat: cfg.default_location.lat,
				lng: cfg.default_location.lng,
			},
		}
	}
}
impl Default for PlannerSettings {
	fn default() -> Self {
		let location = loci_config::DefaultLocation::default();

		Self {
			default_page_size: 10,
			max_page_size: 50,
			candidate_limit: 200,
			default_location: Coordinate { lat: location.lat, lng: location.lng },
		}
	}
}

#[derive(Clone, Debug, Default)]
pub struct Planner {
	settings: PlannerSettings,
}
impl Planner {
	pub fn new(settings: PlannerSettings) -> Self {
		Self { settings }
	}

	pub fn settings(&self) -> &PlannerSettings {
		&self.settings
	}

	pub fn plan(&self, request: &SearchRequest) -> Result<QueryPlan> {
		let session_id = request
			.session_id
			.as_deref()
			.map(str::trim)
			.filter(|id| !id.is_empty())
			.ok_or_else(|| Error::request("session_id is required."))?
			.to_string();
		let pagination = self.pagination(request)?;
		let tree = Condition::parse(&request.logic_tree)?;
		let semantic = scan::scan(tree.as_ref());
		let intent = parse_intent(&session_id, request.main_intent.as_deref());
		let mut ignored_fields = Vec::new();
		let mut selected_fields =
			Field::DEFAULT_OUTPUT.iter().map(|field| select(*field)).collect::<Vec<_>>();
		let mut photos_needed = false;
		let mut distance_requested = false;

		match intent {
			Intent::Recommend => {
				selected_fields = Field::ALL.iter().map(|f| select(*f)).collect();
				photos_needed = true;
				distance_requested =
					request.info_needed.iter().any(|name| is_named(name, DISTANCE_ALIAS));
			},
			Intent::Query => {
				for name in &request.info_needed {
					if is_named(name, PHOTOS_FIELD) {
						photos_needed = true;

						continue;
					}
					if is_named(name, DISTANCE_ALIAS) {
						distance_requested = true;

						continue;
					}

					match FieldRef::resolve(name) {
						FieldRef::Relational(field) =>
							push_unique(&mut selected_fields, select(field)),
						FieldRef::Facility(facility) => push_unique(
							&mut selected_fields,
							SelectedField {
								alias: facility.as_str().to_string(),
								expression: facility.column(),
								join: None,
							},
						),
						other => {
							tracing::warn!(
								session_id = %session_id,
								field = other.name(),
								"Ignoring unknown output field."
							);
							ignored_fields.push(other.name().to_string());
						},
					}
				}
			},
		}

		if semantic.needed {
			// Hybrid scoring reads the popularity signal from the relational rows.
			push_unique(&mut selected_fields, select(Field::ReviewCount));
		}

		let distance_sorted =
			request.sort_conditions.iter().any(|sort| is_named(&sort.field, DISTANCE_ALIAS));
		let distance = self.distance(request, distance_requested || distance_sorted);
		let sort_clauses =
			sort_clauses(&session_id, &request.sort_conditions, &distance, &mut ignored_fields);

		Ok(QueryPlan {
			session_id,
			intent,
			selected_fields,
			sort_clauses,
			pagination,
			distance,
			semantic,
			photos_needed,
			raw_tree: request.logic_tree.clone(),
			tree,
			candidate_limit: self.settings.candidate_limit,
			ignored_fields,
			artifacts: PlanArtifacts::default(),
		})
	}

	fn pagination(&self, request: &SearchRequest) -> Result<Pagination> {
		let page = request.page.unwrap_or(1);
		let page_size = request.page_size.unwrap_or(i64::from(self.settings.default_page_size));

		if page < 1 {
			return Err(Error::request("page must be greater than or equal to 1."));
		}
		if page_size < 1 {
			return Err(Error::request("page_size must be greater than or equal to 1."));
		}

		let page = u32::try_from(page).map_err(|_| Error::request("page is too large."))?;
		let max = i64::from(self.settings.max_page_size);

		if page_size > max {
			tracing::debug!(page_size, max, "Clamping page_size.");
		}

		Ok(Pagination { page, page_size: page_size.min(max) as u32 })
	}

	fn distance(&self, request: &SearchRequest, referenced: bool) -> DistanceRequirement {
		let supplied = request
			.user_location
			.as_ref()
			.filter(|location| !location.lat.is_null() || !location.lng.is_null());

		if let Some(location) = supplied {
			let expression = geo::distance_expression(
				&location.lat,
				&location.lng,
				PLACE_LAT_COLUMN,
				PLACE_LNG_COLUMN,
			);
			let origin = geo::parse_coordinate(&location.lat, &location.lng).ok();

			return DistanceRequirement {
				source: LocationSource::User,
				origin,
				expression: Some(expression),
			};
		}
		if !referenced {
			return DistanceRequirement::inactive();
		}

		let origin = self.settings.default_location;

		DistanceRequirement {
			source: LocationSource::Default,
			origin: Some(origin),
			expression: Some(DistanceExpr {
				sql: geo::haversine_sql(origin, PLACE_LAT_COLUMN, PLACE_LNG_COLUMN),
				failure: None,
			}),
		}
	}
}

fn parse_intent(session_id: &str, raw: Option<&str>) -> Intent {
	match raw.map(|intent| intent.trim().to_ascii_lowercase()).as_deref() {
		None | Some("") | Some("query") => Intent::Query,
		Some("recommend") => Intent::Recommend,
		Some(other) => {
			tracing::warn!(session_id, intent = other, "Unknown main_intent. Treating as query.");

			Intent::Query
		},
	}
}

fn sort_clauses(
	session_id: &str,
	conditions: &[SortCondition],
	distance: &DistanceRequirement,
	ignored_fields: &mut Vec<String>,
) -> Vec<SortClause> {
	let mut out: Vec<SortClause> = Vec::new();

	for condition in conditions {
		let key = if is_named(&condition.field, DISTANCE_ALIAS) {
			if !distance.is_active() {
				tracing::warn!(session_id, "Dropping distance sort without an active distance.");
				ignored_fields.push(DISTANCE_ALIAS.to_string());

				continue;
			}

			SortKey::Distance
		} else {
			match FieldRef::resolve(&condition.field) {
				FieldRef::Relational(field) if field.spec().sort_column().is_some() =>
					SortKey::Field(field),
				other => {
					tracing::warn!(session_id, field = other.name(), "Dropping unsortable field.");
					ignored_fields.push(other.name().to_string());

					continue;
				},
			}
		};
		let direction = match condition.method.as_deref().map(str::trim) {
			Some(method) if method.eq_ignore_ascii_case("desc") => Direction::Desc,
			None => Direction::Asc,
			Some(method) if method.eq_ignore_ascii_case("asc") => Direction::Asc,
			Some(method) => {
				tracing::warn!(session_id, method, "Unknown sort method. Using ASC.");

				Direction::Asc
			},
		};

		if out.iter().any(|clause| clause.key == key) {
			continue;
		}

		out.push(SortClause { key, direction });
	}

	out
}

fn select(field: Field) -> SelectedField {
	let spec = field.spec();

	SelectedField {
		alias: field.as_str().to_string(),
		expression: spec.select.clone(),
		join: spec.join,
	}
}

fn push_unique(fields: &mut Vec<SelectedField>, field: SelectedField) {
	if !fields.iter().any(|existing| existing.alias == field.alias) {
		fields.push(field);
	}
}

fn is_named(raw: &str, name: &str) -> bool {
	raw.trim().eq_ignore_ascii_case(name)
}
