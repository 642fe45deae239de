use anyhow::Context;
use sqlx::FromRow;
use time::{Date, OffsetDateTime, Time};
use uuid::Uuid;

use super::{classifier::MealTimeSlot, dto::DishIn, meal_type::MealType};

/// `meals` row as stored; the label column is plain text.
#[derive(Debug, Clone, FromRow)]
pub struct MealRow {
    pub id: Uuid,
    pub patient_id: Uuid,
    pub meal_type: String,
    pub meal_date: Date,
    pub meal_time: Time,
    pub portion_size: Option<String>,
    pub description: Option<String>,
    pub created_at: OffsetDateTime,
    pub updated_at: OffsetDateTime,
}

impl MealRow {
    pub fn into_meal(self, dishes: Vec<Dish>) -> anyhow::Result<Meal> {
        let meal_type = self
            .meal_type
            .parse::<MealType>()
            .with_context(|| format!("meal {} has a corrupt meal_type", self.id))?;
        Ok(Meal {
            id: self.id,
            patient_id: self.patient_id,
            meal_type,
            meal_date: self.meal_date,
            meal_time: self.meal_time,
            portion_size: self.portion_size,
            description: self.description,
            created_at: self.created_at,
            updated_at: self.updated_at,
            dishes,
        })
    }
}

/// One food item inside a meal.
#[derive(Debug, Clone, PartialEq, FromRow)]
pub struct Dish {
    pub id: Uuid,
    pub meal_id: Uuid,
    pub position: i32,
    pub name: String,
    pub weight: f64,
    pub calories: i32,
    pub protein: f64,
    pub fat: f64,
    pub carbohydrates: f64,
    pub score: Option<f64>,
    pub description: Option<String>,
    pub created_at: OffsetDateTime,
    pub updated_at: OffsetDateTime,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Meal {
    pub id: Uuid,
    pub patient_id: Uuid,
    pub meal_type: MealType,
    pub meal_date: Date,
    pub meal_time: Time,
    pub portion_size: Option<String>,
    pub description: Option<String>,
    pub created_at: OffsetDateTime,
    pub updated_at: OffsetDateTime,
    pub dishes: Vec<Dish>,
}

/// Fully resolved input for inserting a meal; the label is already decided.
#[derive(Debug, Clone)]
pub struct NewMeal {
    pub meal_type: MealType,
    pub meal_date: Date,
    pub meal_time: Time,
    pub portion_size: Option<String>,
    pub description: Option<String>,
    pub dishes: Vec<DishIn>,
}

/// Sparse update. `None` leaves the field untouched; for nullable columns
/// `Some(None)` clears it. `dishes: Some(..)` replaces the whole set.
#[derive(Debug, Clone, Default)]
pub struct MealChanges {
    pub meal_type: Option<MealType>,
    /// Label to use when `meal_time` differs from the stored time and no
    /// explicit `meal_type` is given.
    pub auto_label: Option<MealType>,
    pub meal_date: Option<Date>,
    pub meal_time: Option<Time>,
    pub portion_size: Option<Option<String>>,
    pub description: Option<Option<String>>,
    pub dishes: Option<Vec<DishIn>>,
}

impl MealChanges {
    /// Applies the scalar fields only.
    pub fn apply_scalars(&self, meal: &mut Meal) {
        match (self.meal_type, self.meal_time, self.auto_label) {
            (Some(meal_type), _, _) => meal.meal_type = meal_type,
            (None, Some(at), Some(label)) if at != meal.meal_time => meal.meal_type = label,
            _ => {}
        }
        if let Some(date) = self.meal_date {
            meal.meal_date = date;
        }
        if let Some(at) = self.meal_time {
            meal.meal_time = at;
        }
        if let Some(portion) = &self.portion_size {
            meal.portion_size = portion.clone();
        }
        if let Some(description) = &self.description {
            meal.description = description.clone();
        }
    }
}

/// Date window and label filter for listing meals. Bounds are inclusive.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MealFilter {
    pub from: Option<Date>,
    pub to: Option<Date>,
    pub meal_type: Option<MealType>,
}

impl MealFilter {
    pub fn on(date: Date) -> Self {
        Self {
            from: Some(date),
            to: Some(date),
            meal_type: None,
        }
    }

    pub fn matches(&self, meal: &Meal) -> bool {
        self.from.map_or(true, |from| meal.meal_date >= from)
            && self.to.map_or(true, |to| meal.meal_date <= to)
            && self.meal_type.map_or(true, |t| meal.meal_type == t)
    }
}

#[derive(Debug, FromRow)]
pub struct SlotRow {
    pub meal_type: String,
    pub start_hour: i16,
    pub end_hour: i16,
}

impl TryFrom<SlotRow> for MealTimeSlot {
    type Error = anyhow::Error;

    fn try_from(row: SlotRow) -> anyhow::Result<Self> {
        let meal_type = row.meal_type.parse::<MealType>()?;
        let start_hour = u8::try_from(row.start_hour)
            .ok()
            .filter(|h| *h < 24)
            .with_context(|| format!("slot {} start_hour {} out of range", meal_type, row.start_hour))?;
        let end_hour = u8::try_from(row.end_hour)
            .ok()
            .filter(|h| *h < 24)
            .with_context(|| format!("slot {} end_hour {} out of range", meal_type, row.end_hour))?;
        Ok(MealTimeSlot::new(meal_type, start_hour, end_hour))
    }
}
