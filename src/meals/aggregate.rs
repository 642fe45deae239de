use std::collections::BTreeMap;

use serde::Serialize;
use time::Date;

use super::{
    meal_type::MealType,
    repo_types::{Dish, Meal},
};

/// Relative tolerance between stated calories and the 4/4/9 estimate.
const CALORIE_TOLERANCE: f64 = 0.3;

/// Derived totals over a meal's current dishes. Never stored.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct MealTotals {
    pub total_weight: f64,
    pub total_calories: i64,
    pub total_protein: f64,
    pub total_fat: f64,
    pub total_carbohydrates: f64,
    /// Mean score of the dishes that carry one; 0.0 when none do.
    pub avg_score: f64,
}

impl MealTotals {
    pub fn from_dishes<'a>(dishes: impl IntoIterator<Item = &'a Dish>) -> Self {
        let mut totals = MealTotals::default();
        let (mut score_sum, mut scored) = (0.0, 0u32);
        for dish in dishes {
            totals.total_weight += dish.weight;
            totals.total_calories += i64::from(dish.calories);
            totals.total_protein += dish.protein;
            totals.total_fat += dish.fat;
            totals.total_carbohydrates += dish.carbohydrates;
            if let Some(score) = dish.score {
                score_sum += score;
                scored += 1;
            }
        }
        if scored > 0 {
            totals.avg_score = score_sum / f64::from(scored);
        }
        totals
    }
}

impl Meal {
    pub fn totals(&self) -> MealTotals {
        MealTotals::from_dishes(&self.dishes)
    }
}

impl Dish {
    /// Stated calories agree with 4·protein + 4·carbohydrates + 9·fat within 30%.
    pub fn calories_consistent(&self) -> bool {
        let estimated = 4.0 * self.protein + 4.0 * self.carbohydrates + 9.0 * self.fat;
        let stated = f64::from(self.calories);
        (stated - estimated).abs() <= stated * CALORIE_TOLERANCE
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct TypeTotals {
    pub count: u32,
    pub calories: i64,
    pub protein: f64,
    pub fat: f64,
    pub carbohydrates: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DailySummary {
    #[serde(with = "crate::meals::dto::iso_date")]
    pub date: Date,
    pub total_meals: usize,
    pub total_calories: i64,
    pub total_protein: f64,
    pub total_fat: f64,
    pub total_carbohydrates: f64,
    pub by_meal_type: BTreeMap<MealType, TypeTotals>,
}

impl DailySummary {
    pub fn from_meals(date: Date, meals: &[Meal]) -> Self {
        let mut summary = DailySummary {
            date,
            total_meals: meals.len(),
            total_calories: 0,
            total_protein: 0.0,
            total_fat: 0.0,
            total_carbohydrates: 0.0,
            by_meal_type: BTreeMap::new(),
        };
        for meal in meals {
            let totals = meal.totals();
            summary.total_calories += totals.total_calories;
            summary.total_protein += totals.total_protein;
            summary.total_fat += totals.total_fat;
            summary.total_carbohydrates += totals.total_carbohydrates;

            let bucket = summary.by_meal_type.entry(meal.meal_type).or_default();
            bucket.count += 1;
            bucket.calories += totals.total_calories;
            bucket.protein += totals.total_protein;
            bucket.fat += totals.total_fat;
            bucket.carbohydrates += totals.total_carbohydrates;
        }
        summary.total_protein = round1(summary.total_protein);
        summary.total_fat = round1(summary.total_fat);
        summary.total_carbohydrates = round1(summary.total_carbohydrates);
        summary
    }
}

fn round1(value: f64) -> f64 {
    (value * 10.0).round() / 10.0
}
