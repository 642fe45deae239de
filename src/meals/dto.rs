use serde::{Deserialize, Deserializer, Serialize};
use time::{Date, OffsetDateTime, Time};
use uuid::Uuid;
use validator::Validate;

use crate::error::{DiaryError, FieldErrors};

use super::{
    aggregate::MealTotals,
    meal_type::{Lang, MealType},
    repo_types::{Dish, Meal, MealFilter},
};

const DESCRIPTION_MAX: usize = 200;

/// `YYYY-MM-DD` dates.
pub mod iso_date {
    use serde::{de, Deserialize, Deserializer, Serializer};
    use time::{format_description::FormatItem, macros::format_description, Date};

    const FORMAT: &[FormatItem<'static>] = format_description!("[year]-[month]-[day]");

    pub fn serialize<S: Serializer>(date: &Date, s: S) -> Result<S::Ok, S::Error> {
        let out = date.format(FORMAT).map_err(serde::ser::Error::custom)?;
        s.serialize_str(&out)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Date, D::Error> {
        let raw = String::deserialize(d)?;
        Date::parse(raw.trim(), FORMAT)
            .map_err(|e| de::Error::custom(format!("`{}` is not a YYYY-MM-DD date: {}", raw, e)))
    }

    pub mod option {
        use super::*;

        pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Option<Date>, D::Error> {
            match Option::<String>::deserialize(d)? {
                Some(raw) if !raw.trim().is_empty() => Date::parse(raw.trim(), FORMAT)
                    .map(Some)
                    .map_err(|e| {
                        de::Error::custom(format!("`{}` is not a YYYY-MM-DD date: {}", raw, e))
                    }),
                _ => Ok(None),
            }
        }
    }
}

/// Wall-clock times: accepts `HH:MM` or `HH:MM:SS`, emits `HH:MM:SS`.
pub mod clock {
    use serde::{de, Deserialize, Deserializer, Serializer};
    use time::{format_description::FormatItem, macros::format_description, Time};

    const HMS: &[FormatItem<'static>] = format_description!("[hour]:[minute]:[second]");
    const HM: &[FormatItem<'static>] = format_description!("[hour]:[minute]");

    pub fn parse(raw: &str) -> Result<Time, String> {
        let raw = raw.trim();
        Time::parse(raw, HMS)
            .or_else(|_| Time::parse(raw, HM))
            .map_err(|_| format!("`{}` is not a HH:MM[:SS] time", raw))
    }

    pub fn serialize<S: Serializer>(at: &Time, s: S) -> Result<S::Ok, S::Error> {
        let out = at.format(HMS).map_err(serde::ser::Error::custom)?;
        s.serialize_str(&out)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Time, D::Error> {
        parse(&String::deserialize(d)?).map_err(de::Error::custom)
    }

    pub mod option {
        use super::*;

        pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Option<Time>, D::Error> {
            Option::<String>::deserialize(d)?
                .map(|raw| parse(&raw))
                .transpose()
                .map_err(de::Error::custom)
        }
    }
}

/// Distinguishes an absent field (`None`) from an explicit `null` (`Some(None)`).
fn patch_field<'de, D, T>(d: D) -> Result<Option<Option<T>>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    Option::<T>::deserialize(d).map(Some)
}

// --- requests ---

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct DishIn {
    #[validate(length(min = 1, max = 200, message = "must be 1 to 200 characters"))]
    pub name: String,
    #[validate(range(exclusive_min = 0.0, max = 10000.0, message = "must be greater than 0 and at most 10000 g"))]
    pub weight: f64,
    #[validate(range(min = 0, max = 10000, message = "must be between 0 and 10000"))]
    pub calories: i32,
    #[validate(range(min = 0.0, max = 1000.0, message = "must be between 0 and 1000 g"))]
    pub protein: f64,
    #[validate(range(min = 0.0, max = 1000.0, message = "must be between 0 and 1000 g"))]
    pub fat: f64,
    #[validate(range(min = 0.0, max = 1000.0, message = "must be between 0 and 1000 g"))]
    pub carbohydrates: f64,
    #[serde(default)]
    #[validate(range(min = 0.0, max = 1.0, message = "must be between 0 and 1"))]
    pub score: Option<f64>,
    #[serde(default)]
    #[validate(length(max = 200, message = "must be at most 200 characters"))]
    pub description: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct MealCreateIn {
    #[serde(default, alias = "name")]
    pub meal_type: Option<MealType>,
    #[serde(default, with = "iso_date::option")]
    pub meal_date: Option<Date>,
    #[serde(default, with = "clock::option")]
    pub meal_time: Option<Time>,
    #[serde(default)]
    pub portion_size: Option<String>,
    #[serde(default)]
    #[validate(length(max = 200, message = "must be at most 200 characters"))]
    pub description: Option<String>,
    #[validate(length(min = 1, message = "at least one component is required"), nested)]
    pub components: Vec<DishIn>,
}

/// Merge-patch body: only fields present in the JSON are changed.
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct MealUpdateIn {
    /// Canonical hyphenated form only; checked by the service.
    pub id: String,
    #[serde(default, alias = "name")]
    pub meal_type: Option<MealType>,
    #[serde(default, with = "iso_date::option")]
    pub meal_date: Option<Date>,
    #[serde(default, with = "clock::option")]
    pub meal_time: Option<Time>,
    #[serde(default, deserialize_with = "patch_field")]
    pub portion_size: Option<Option<String>>,
    #[serde(default, deserialize_with = "patch_field")]
    pub description: Option<Option<String>>,
    #[serde(default)]
    #[validate(length(min = 1, message = "at least one component is required"), nested)]
    pub components: Option<Vec<DishIn>>,
}

impl MealUpdateIn {
    pub fn check(&self) -> Result<(), DiaryError> {
        let mut fields = FieldErrors::new();
        if let Err(errors) = self.validate() {
            if let DiaryError::Validation {
                field_errors: Some(found),
                ..
            } = DiaryError::from(errors)
            {
                fields.extend(found);
            }
        }
        if let Some(Some(description)) = &self.description {
            if description.chars().count() > DESCRIPTION_MAX {
                fields
                    .entry("description".into())
                    .or_default()
                    .push("must be at most 200 characters".into());
            }
        }
        if fields.is_empty() {
            Ok(())
        } else {
            Err(DiaryError::invalid_fields(fields))
        }
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct ListQuery {
    #[serde(default, rename = "dateTime", with = "iso_date::option")]
    pub date: Option<Date>,
    #[serde(default, with = "iso_date::option")]
    pub from_date: Option<Date>,
    #[serde(default, with = "iso_date::option")]
    pub to_date: Option<Date>,
}

#[derive(Debug, Default, Deserialize)]
pub struct HistoryQuery {
    #[serde(default, rename = "dateTime", with = "iso_date::option")]
    pub date: Option<Date>,
    #[serde(default, with = "iso_date::option")]
    pub from_date: Option<Date>,
    #[serde(default, with = "iso_date::option")]
    pub to_date: Option<Date>,
    #[serde(default, rename = "mealType", alias = "meal_type")]
    pub meal_type: Option<MealType>,
}

impl ListQuery {
    pub fn filter(&self) -> MealFilter {
        range_filter(self.date, self.from_date, self.to_date, None)
    }
}

impl HistoryQuery {
    pub fn filter(&self) -> MealFilter {
        range_filter(self.date, self.from_date, self.to_date, self.meal_type)
    }
}

/// A single `dateTime` wins over a `from_date`/`to_date` range.
fn range_filter(
    date: Option<Date>,
    from: Option<Date>,
    to: Option<Date>,
    meal_type: Option<MealType>,
) -> MealFilter {
    match date {
        Some(day) => MealFilter {
            meal_type,
            ..MealFilter::on(day)
        },
        None => MealFilter { from, to, meal_type },
    }
}

#[derive(Debug, Deserialize)]
pub struct DeleteQuery {
    #[serde(rename = "mealId", alias = "id")]
    pub meal_id: String,
}

#[derive(Debug, Default, Deserialize)]
pub struct SummaryQuery {
    #[serde(default, with = "iso_date::option")]
    pub date: Option<Date>,
}

// --- responses ---

#[derive(Debug, Serialize)]
pub struct DishOut {
    pub id: Uuid,
    pub name: String,
    pub weight: f64,
    pub calories: i32,
    pub protein: f64,
    pub fat: f64,
    pub carbohydrates: f64,
    pub score: Option<f64>,
    pub description: Option<String>,
    pub calories_consistent: bool,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
}

impl From<Dish> for DishOut {
    fn from(d: Dish) -> Self {
        Self {
            calories_consistent: d.calories_consistent(),
            id: d.id,
            name: d.name,
            weight: d.weight,
            calories: d.calories,
            protein: d.protein,
            fat: d.fat,
            carbohydrates: d.carbohydrates,
            score: d.score,
            description: d.description,
            created_at: d.created_at,
            updated_at: d.updated_at,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct MealOut {
    pub id: Uuid,
    pub patient_id: Uuid,
    pub meal_type: MealType,
    pub meal_type_title: &'static str,
    #[serde(with = "iso_date")]
    pub meal_date: Date,
    #[serde(with = "clock")]
    pub meal_time: Time,
    pub portion_size: Option<String>,
    pub description: Option<String>,
    pub components: Vec<DishOut>,
    #[serde(flatten)]
    pub totals: MealTotals,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
}

impl MealOut {
    pub fn present(meal: Meal, lang: Lang) -> Self {
        let totals = meal.totals();
        Self {
            id: meal.id,
            patient_id: meal.patient_id,
            meal_type: meal.meal_type,
            meal_type_title: meal.meal_type.title(lang),
            meal_date: meal.meal_date,
            meal_time: meal.meal_time,
            portion_size: meal.portion_size,
            description: meal.description,
            components: meal.dishes.into_iter().map(DishOut::from).collect(),
            totals,
            created_at: meal.created_at,
            updated_at: meal.updated_at,
        }
    }
}

/// Success envelope shared by every endpoint.
#[derive(Debug, Serialize)]
pub struct Envelope<T> {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<&'static str>,
    pub data: T,
}

impl<T> Envelope<T> {
    pub fn data(data: T) -> Self {
        Self {
            success: true,
            message: None,
            data,
        }
    }

    pub fn with_message(message: &'static str, data: T) -> Self {
        Self {
            success: true,
            message: Some(message),
            data,
        }
    }
}

#[derive(Debug, Default, Serialize)]
pub struct AppliedFilters {
    #[serde(skip_serializing_if = "Option::is_none", with = "opt_iso_date")]
    pub date: Option<Date>,
    #[serde(skip_serializing_if = "Option::is_none", with = "opt_iso_date")]
    pub from: Option<Date>,
    #[serde(skip_serializing_if = "Option::is_none", with = "opt_iso_date")]
    pub to: Option<Date>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub meal_type: Option<MealType>,
}

impl AppliedFilters {
    /// Echo of the filter as the caller expressed it; `None` when nothing applies.
    pub fn describe(filter: &MealFilter) -> Option<Self> {
        let applied = match (filter.from, filter.to) {
            (Some(from), Some(to)) if from == to => AppliedFilters {
                date: Some(from),
                meal_type: filter.meal_type,
                ..Default::default()
            },
            (from, to) => AppliedFilters {
                from,
                to,
                meal_type: filter.meal_type,
                ..Default::default()
            },
        };
        let empty = applied.date.is_none()
            && applied.from.is_none()
            && applied.to.is_none()
            && applied.meal_type.is_none();
        (!empty).then_some(applied)
    }
}

mod opt_iso_date {
    use serde::Serializer;
    use time::Date;

    pub fn serialize<S: Serializer>(date: &Option<Date>, s: S) -> Result<S::Ok, S::Error> {
        match date {
            Some(d) => super::iso_date::serialize(d, s),
            None => s.serialize_none(),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct MealListResponse {
    pub success: bool,
    pub data: Vec<MealOut>,
    pub count: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub filters: Option<AppliedFilters>,
}

#[derive(Debug, Serialize)]
pub struct DeletedResponse {
    pub success: bool,
    pub message: &'static str,
    pub deleted_id: Uuid,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use time::macros::{date, time};

    fn dish_json() -> serde_json::Value {
        json!({
            "name": "Omelette",
            "weight": 200.0,
            "calories": 350,
            "protein": 20.0,
            "fat": 25.0,
            "carbohydrates": 5.0,
            "score": 0.8
        })
    }

    #[test]
    fn create_accepts_short_time_and_legacy_name_alias() {
        let body: MealCreateIn = serde_json::from_value(json!({
            "name": "breakfast",
            "meal_date": "2026-02-13",
            "meal_time": "08:30",
            "components": [dish_json()]
        }))
        .unwrap();
        assert_eq!(body.meal_type, Some(MealType::Breakfast));
        assert_eq!(body.meal_date, Some(date!(2026 - 02 - 13)));
        assert_eq!(body.meal_time, Some(time!(8:30)));
        assert!(body.validate().is_ok());
    }

    #[test]
    fn create_rejects_unknown_meal_type() {
        let err = serde_json::from_value::<MealCreateIn>(json!({
            "meal_type": "brunch",
            "components": [dish_json()]
        }))
        .unwrap_err();
        assert!(err.to_string().contains("brunch"));
    }

    #[test]
    fn create_requires_components() {
        let body: MealCreateIn = serde_json::from_value(json!({ "components": [] })).unwrap();
        let err: DiaryError = body.validate().unwrap_err().into();
        let DiaryError::Validation { field_errors, .. } = err else {
            panic!("expected validation error");
        };
        assert!(field_errors.unwrap().contains_key("components"));
    }

    #[test]
    fn dish_weight_must_be_positive() {
        let mut dish = dish_json();
        dish["weight"] = json!(0.0);
        dish["score"] = json!(1.5);
        let body: MealCreateIn =
            serde_json::from_value(json!({ "components": [dish_json(), dish] })).unwrap();
        let err: DiaryError = body.validate().unwrap_err().into();
        let DiaryError::Validation { field_errors, .. } = err else {
            panic!("expected validation error");
        };
        let fields = field_errors.unwrap();
        assert!(fields.contains_key("components[1].weight"));
        assert!(fields.contains_key("components[1].score"));
        assert!(!fields.contains_key("components[0].weight"));
    }

    #[test]
    fn update_distinguishes_absent_from_null() {
        let id = Uuid::new_v4();
        let body: MealUpdateIn =
            serde_json::from_value(json!({ "id": id, "description": null })).unwrap();
        assert_eq!(body.description, Some(None));
        assert_eq!(body.portion_size, None);
        assert!(body.components.is_none());

        let body: MealUpdateIn =
            serde_json::from_value(json!({ "id": id, "description": "light" })).unwrap();
        assert_eq!(body.description, Some(Some("light".to_string())));
        assert!(body.check().is_ok());
    }

    #[test]
    fn update_rejects_empty_component_list_and_long_description() {
        let body: MealUpdateIn = serde_json::from_value(json!({
            "id": Uuid::new_v4(),
            "description": "x".repeat(201),
            "components": []
        }))
        .unwrap();
        let DiaryError::Validation { field_errors, .. } = body.check().unwrap_err() else {
            panic!("expected validation error");
        };
        let fields = field_errors.unwrap();
        assert!(fields.contains_key("components"));
        assert!(fields.contains_key("description"));
    }

    #[test]
    fn single_date_wins_over_range() {
        let q = ListQuery {
            date: Some(date!(2026 - 02 - 13)),
            from_date: Some(date!(2026 - 02 - 01)),
            to_date: None,
        };
        assert_eq!(q.filter(), MealFilter::on(date!(2026 - 02 - 13)));

        let echo = serde_json::to_value(AppliedFilters::describe(&q.filter())).unwrap();
        assert_eq!(echo, json!({ "date": "2026-02-13" }));
        assert!(AppliedFilters::describe(&MealFilter::default()).is_none());
    }

    #[test]
    fn times_parse_with_or_without_seconds() {
        assert_eq!(clock::parse("07:05").unwrap(), time!(7:05));
        assert_eq!(clock::parse("23:59:30").unwrap(), time!(23:59:30));
        assert!(clock::parse("25:00").is_err());
    }
}
