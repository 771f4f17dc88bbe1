//! Static classification of every field name a request may mention.
//!
//! Classification happens once per leaf at plan-build time. The compiler only ever sees the
//! resolved [`FieldRef`], never a raw name.

use std::{collections::HashMap, sync::LazyLock};

use serde::Serialize;

pub const PLACE_ALIAS: &str = "p";
pub const PLACE_TABLE: &str = "all_places";
pub const PLACE_ID_COLUMN: &str = "p.id";
pub const PLACE_LAT_COLUMN: &str = "p.lat";
pub const PLACE_LNG_COLUMN: &str = "p.lng";

static CATALOG: LazyLock<Catalog> = LazyLock::new(Catalog::build);

/// Relational attributes of a place, either stored on the place row or reached through a join.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Field {
	Id,
	Name,
	Address,
	Rating,
	ReviewCount,
	PriceLevel,
	FoodType,
	MerchantCategory,
	ServiceTags,
	Phone,
	OpeningHours,
	FacilityTags,
}
impl Field {
	pub const ALL: [Self; 12] = [
		Self::Id,
		Self::Name,
		Self::Address,
		Self::Rating,
		Self::ReviewCount,
		Self::PriceLevel,
		Self::FoodType,
		Self::MerchantCategory,
		Self::ServiceTags,
		Self::Phone,
		Self::OpeningHours,
		Self::FacilityTags,
	];
	/// Always selected, in this order, ahead of anything the request asks for.
	pub const DEFAULT_OUTPUT: [Self; 4] = [Self::Id, Self::Name, Self::Address, Self::Rating];

	pub fn as_str(self) -> &'static str {
		match self {
			Self::Id => "id",
			Self::Name => "name",
			Self::Address => "address",
			Self::Rating => "rating",
			Self::ReviewCount => "review_count",
			Self::PriceLevel => "price_level",
			Self::FoodType => "food_type",
			Self::MerchantCategory => "merchant_category",
			Self::ServiceTags => "service_tags",
			Self::Phone => "phone",
			Self::OpeningHours => "opening_hours",
			Self::FacilityTags => "facility_tags",
		}
	}

	pub fn spec(self) -> &'static FieldSpec {
		Catalog::get().spec(self)
	}
}

/// Boolean amenity flags, each backed by a dedicated column on the place row.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Facility {
	AirConditioning,
	Wifi,
	Parking,
	WheelchairAccessible,
	PetFriendly,
	OutdoorSeating,
	Reservable,
	AcceptsCreditCards,
}
impl Facility {
	pub const ALL: [Self; 8] = [
		Self::AirConditioning,
		Self::Wifi,
		Self::Parking,
		Self::WheelchairAccessible,
		Self::PetFriendly,
		Self::OutdoorSeating,
		Self::Reservable,
		Self::AcceptsCreditCards,
	];

	pub fn as_str(self) -> &'static str {
		match self {
			Self::AirConditioning => "air_conditioning",
			Self::Wifi => "wifi",
			Self::Parking => "parking",
			Self::WheelchairAccessible => "wheelchair_accessible",
			Self::PetFriendly => "pet_friendly",
			Self::OutdoorSeating => "outdoor_seating",
			Self::Reservable => "reservable",
			Self::AcceptsCreditCards => "accepts_credit_cards",
		}
	}

	pub fn column(self) -> String {
		format!("{PLACE_ALIAS}.{}", self.as_str())
	}
}

/// Fields answered by the similarity index instead of the relational store.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SemanticField {
	CuisineType,
	Flavor,
	DishName,
}
impl SemanticField {
	pub const ALL: [Self; 3] = [Self::CuisineType, Self::Flavor, Self::DishName];

	pub fn as_str(self) -> &'static str {
		match self {
			Self::CuisineType => "cuisine_type",
			Self::Flavor => "flavor",
			Self::DishName => "dish_name",
		}
	}
}

/// The result of resolving a field name against the catalog.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum FieldRef {
	Relational(Field),
	Facility(Facility),
	Semantic(SemanticField),
	Unknown(String),
}
impl FieldRef {
	pub fn resolve(name: &str) -> Self {
		Catalog::get().resolve(name)
	}

	pub fn name(&self) -> &str {
		match self {
			Self::Relational(field) => field.as_str(),
			Self::Facility(facility) => facility.as_str(),
			Self::Semantic(field) => field.as_str(),
			Self::Unknown(name) => name.as_str(),
		}
	}

	pub fn is_semantic(&self) -> bool {
		matches!(self, Self::Semantic(_))
	}
}

/// How a relational leaf is lowered regardless of the comparator it asks for.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MatchPolicy {
	/// Free text. Always compiled to a `LIKE '%value%'` match.
	Substring,
	/// Comparator is honored as requested.
	General,
}

/// One-to-many relations reachable from the place row.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Join {
	MerchantCategory,
	ServiceTags,
}
impl Join {
	pub fn clause(self) -> &'static str {
		match self {
			Self::MerchantCategory =>
				"LEFT JOIN place_merchant_category pmc ON p.id = pmc.place_id \
				 LEFT JOIN merchant_category mc ON pmc.merchant_category_id = mc.category_id",
			Self::ServiceTags =>
				"LEFT JOIN place_tags pt ON p.id = pt.place_id \
				 LEFT JOIN tags_overview tow ON pt.tag_id = tow.tag_id",
		}
	}
}

/// Storage type of a filter column, used to coerce literals before binding.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ValueKind {
	Text,
	Integer,
	Decimal,
}

#[derive(Debug)]
pub struct FieldSpec {
	pub field: Field,
	/// Column compared in WHERE clauses. `None` for output-only fields.
	pub filter_column: Option<&'static str>,
	pub policy: MatchPolicy,
	pub kind: ValueKind,
	/// Expression emitted in the SELECT list.
	pub select: String,
	pub join: Option<Join>,
}
impl FieldSpec {
	/// Scalar columns on the place row can be ordered on directly.
	pub fn sort_column(&self) -> Option<&'static str> {
		if self.join.is_some() { None } else { self.filter_column }
	}
}

pub struct Catalog {
	specs: Vec<FieldSpec>,
	by_name: HashMap<&'static str, FieldRef>,
}
impl Catalog {
	pub fn get() -> &'static Self {
		&CATALOG
	}

	pub fn spec(&self, field: Field) -> &FieldSpec {
		&self.specs[field as usize]
	}

	pub fn resolve(&self, name: &str) -> FieldRef {
		let normalized = name.trim().to_ascii_lowercase();

		self.by_name.get(normalized.as_str()).cloned().unwrap_or(FieldRef::Unknown(normalized))
	}

	fn build() -> Self {
		let specs = Field::ALL.iter().map(|field| field_spec(*field)).collect();
		let mut by_name = HashMap::new();

		for field in Field::ALL {
			by_name.insert(field.as_str(), FieldRef::Relational(field));
		}
		for facility in Facility::ALL {
			by_name.insert(facility.as_str(), FieldRef::Facility(facility));
		}
		for field in SemanticField::ALL {
			by_name.insert(field.as_str(), FieldRef::Semantic(field));
		}

		Self { specs, by_name }
	}
}

fn field_spec(field: Field) -> FieldSpec {
	let (filter_column, policy, join) = match field {
		Field::Id => (Some("p.id"), MatchPolicy::General, None),
		Field::Name => (Some("p.name"), MatchPolicy::Substring, None),
		Field::Address => (Some("p.address"), MatchPolicy::Substring, None),
		Field::Rating => (Some("p.rating"), MatchPolicy::General, None),
		Field::ReviewCount => (Some("p.user_ratings_total"), MatchPolicy::General, None),
		Field::PriceLevel => (Some("p.price_level"), MatchPolicy::General, None),
		Field::FoodType => (Some("p.food_type"), MatchPolicy::Substring, None),
		Field::MerchantCategory =>
			(Some("mc.name"), MatchPolicy::Substring, Some(Join::MerchantCategory)),
		Field::ServiceTags =>
			(Some("tow.tag_content"), MatchPolicy::General, Some(Join::ServiceTags)),
		Field::Phone => (None, MatchPolicy::General, None),
		Field::OpeningHours => (None, MatchPolicy::General, None),
		Field::FacilityTags => (None, MatchPolicy::General, None),
	};
	let kind = match field {
		Field::Id | Field::ReviewCount | Field::PriceLevel => ValueKind::Integer,
		Field::Rating => ValueKind::Decimal,
		_ => ValueKind::Text,
	};
	let select = match field {
		Field::ReviewCount => "p.user_ratings_total".to_string(),
		Field::MerchantCategory => "string_agg(DISTINCT mc.name, ',')".to_string(),
		Field::ServiceTags => "string_agg(DISTINCT tow.tag_content, ',')".to_string(),
		Field::FacilityTags => facility_tags_expression(),
		other => format!("{PLACE_ALIAS}.{}", other.as_str()),
	};

	FieldSpec { field, filter_column, policy, kind, select, join }
}

fn facility_tags_expression() -> String {
	let cases = Facility::ALL
		.iter()
		.map(|facility| format!("CASE WHEN {} THEN '{}' END", facility.column(), facility.as_str()))
		.collect::<Vec<_>>()
		.join(", ");

	format!("array_remove(ARRAY[{cases}], NULL)")
}
