use std::collections::HashMap;

use async_trait::async_trait;
use time::OffsetDateTime;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::error::DiaryError;

use super::{
    classifier::{default_slots, MealTimeSlot, SlotSource},
    dto::DishIn,
    repo::MealStore,
    repo_types::{Dish, Meal, MealChanges, MealFilter, NewMeal},
};

/// Process-local store with the same contract as the Postgres one.
/// Backs `DIARY_STORE=memory` and the router tests.
pub struct MemoryMealStore {
    meals: RwLock<HashMap<Uuid, Meal>>,
    slots: Vec<MealTimeSlot>,
}

impl Default for MemoryMealStore {
    fn default() -> Self {
        Self::with_slots(default_slots())
    }
}

impl MemoryMealStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_slots(slots: Vec<MealTimeSlot>) -> Self {
        Self {
            meals: RwLock::new(HashMap::new()),
            slots,
        }
    }
}

fn same_key(a: &Meal, b: &Meal) -> bool {
    a.id != b.id
        && a.patient_id == b.patient_id
        && a.meal_date == b.meal_date
        && a.meal_time == b.meal_time
        && a.meal_type == b.meal_type
}

fn build_dishes(meal_id: Uuid, dishes: &[DishIn], now: OffsetDateTime) -> Vec<Dish> {
    dishes
        .iter()
        .enumerate()
        .map(|(position, d)| Dish {
            id: Uuid::new_v4(),
            meal_id,
            position: position as i32,
            name: d.name.clone(),
            weight: d.weight,
            calories: d.calories,
            protein: d.protein,
            fat: d.fat,
            carbohydrates: d.carbohydrates,
            score: d.score,
            description: d.description.clone(),
            created_at: now,
            updated_at: now,
        })
        .collect()
}

#[async_trait]
impl MealStore for MemoryMealStore {
    async fn create(&self, patient_id: Uuid, meal: NewMeal) -> Result<Meal, DiaryError> {
        let now = OffsetDateTime::now_utc();
        let id = Uuid::new_v4();
        let created = Meal {
            id,
            patient_id,
            meal_type: meal.meal_type,
            meal_date: meal.meal_date,
            meal_time: meal.meal_time,
            portion_size: meal.portion_size,
            description: meal.description,
            created_at: now,
            updated_at: now,
            dishes: build_dishes(id, &meal.dishes, now),
        };

        let mut meals = self.meals.write().await;
        if meals.values().any(|m| same_key(m, &created)) {
            return Err(DiaryError::duplicate_meal());
        }
        meals.insert(id, created.clone());
        Ok(created)
    }

    async fn update(
        &self,
        patient_id: Uuid,
        meal_id: Uuid,
        changes: MealChanges,
    ) -> Result<Meal, DiaryError> {
        let mut meals = self.meals.write().await;
        let mut updated = meals
            .get(&meal_id)
            .filter(|m| m.patient_id == patient_id)
            .cloned()
            .ok_or_else(|| DiaryError::meal_not_found(meal_id))?;

        let now = OffsetDateTime::now_utc();
        changes.apply_scalars(&mut updated);
        updated.updated_at = now;
        if let Some(replacement) = &changes.dishes {
            updated.dishes = build_dishes(meal_id, replacement, now);
        }

        if meals.values().any(|m| same_key(m, &updated)) {
            return Err(DiaryError::duplicate_meal());
        }
        meals.insert(meal_id, updated.clone());
        Ok(updated)
    }

    async fn get(&self, patient_id: Uuid, meal_id: Uuid) -> Result<Meal, DiaryError> {
        self.meals
            .read()
            .await
            .get(&meal_id)
            .filter(|m| m.patient_id == patient_id)
            .cloned()
            .ok_or_else(|| DiaryError::meal_not_found(meal_id))
    }

    async fn list(&self, patient_id: Uuid, filter: MealFilter) -> Result<Vec<Meal>, DiaryError> {
        let mut found: Vec<Meal> = self
            .meals
            .read()
            .await
            .values()
            .filter(|m| m.patient_id == patient_id && filter.matches(m))
            .cloned()
            .collect();
        found.sort_by(|a, b| {
            b.meal_date
                .cmp(&a.meal_date)
                .then(b.meal_time.cmp(&a.meal_time))
        });
        Ok(found)
    }

    async fn delete(&self, patient_id: Uuid, meal_id: Uuid) -> Result<(), DiaryError> {
        let mut meals = self.meals.write().await;
        match meals.get(&meal_id) {
            Some(m) if m.patient_id == patient_id => {
                meals.remove(&meal_id);
                Ok(())
            }
            _ => Err(DiaryError::meal_not_found(meal_id)),
        }
    }
}

#[async_trait]
impl SlotSource for MemoryMealStore {
    async fn load_slots(&self) -> anyhow::Result<Vec<MealTimeSlot>> {
        let mut slots = self.slots.clone();
        slots.sort_by_key(|s| s.start_hour);
        Ok(slots)
    }
}
