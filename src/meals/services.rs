use std::sync::Arc;

use time::{Date, OffsetDateTime, Time};
use tracing::{debug, info};
use uuid::Uuid;
use validator::Validate;

use crate::{error::DiaryError, state::AppState};

use super::{
    aggregate::DailySummary,
    classifier::MealTimeSlot,
    dto::{MealCreateIn, MealUpdateIn},
    repo_types::{Meal, MealChanges, MealFilter, NewMeal},
};

/// Identifiers are accepted only in canonical hyphenated form.
pub fn parse_meal_id(raw: &str) -> Result<Uuid, DiaryError> {
    let raw = raw.trim();
    if raw.len() != 36 {
        return Err(DiaryError::invalid(format!("invalid meal id `{}`", raw)));
    }
    Uuid::parse_str(raw).map_err(|_| DiaryError::invalid(format!("invalid meal id `{}`", raw)))
}

fn now_utc() -> (Date, Time) {
    let now = OffsetDateTime::now_utc();
    // Sub-second precision is noise for a diary entry.
    let at = Time::from_hms(now.hour(), now.minute(), now.second()).unwrap_or(Time::MIDNIGHT);
    (now.date(), at)
}

pub async fn create_meal(
    state: &AppState,
    patient_id: Uuid,
    input: MealCreateIn,
) -> Result<Meal, DiaryError> {
    input.validate()?;

    let (today, now) = now_utc();
    let meal_date = input.meal_date.unwrap_or(today);
    let meal_time = input.meal_time.unwrap_or(now);
    let meal_type = match input.meal_type {
        Some(t) => t,
        None => {
            let derived = state.classifier.classify(meal_time).await;
            debug!(%meal_time, meal_type = %derived, "meal type derived from time");
            derived
        }
    };

    let meal = state
        .store
        .create(
            patient_id,
            NewMeal {
                meal_type,
                meal_date,
                meal_time,
                portion_size: input.portion_size,
                description: input.description,
                dishes: input.components,
            },
        )
        .await?;

    info!(%patient_id, meal_id = %meal.id, meal_type = %meal.meal_type, dishes = meal.dishes.len(), "meal created");
    Ok(meal)
}

pub async fn update_meal(
    state: &AppState,
    patient_id: Uuid,
    input: MealUpdateIn,
) -> Result<Meal, DiaryError> {
    input.check()?;
    let meal_id = parse_meal_id(&input.id)?;

    // Used by the store only if the stored time actually changes.
    let auto_label = match (input.meal_type, input.meal_time) {
        (None, Some(at)) => Some(state.classifier.classify(at).await),
        _ => None,
    };

    let changes = MealChanges {
        meal_type: input.meal_type,
        auto_label,
        meal_date: input.meal_date,
        meal_time: input.meal_time,
        portion_size: input.portion_size,
        description: input.description,
        dishes: input.components,
    };
    let replaced = changes.dishes.is_some();

    let meal = state.store.update(patient_id, meal_id, changes).await?;

    info!(%patient_id, meal_id = %meal.id, dishes_replaced = replaced, "meal updated");
    Ok(meal)
}

pub async fn get_meal(state: &AppState, patient_id: Uuid, meal_id: Uuid) -> Result<Meal, DiaryError> {
    state.store.get(patient_id, meal_id).await
}

pub async fn list_meals(
    state: &AppState,
    patient_id: Uuid,
    filter: MealFilter,
) -> Result<Vec<Meal>, DiaryError> {
    if let (Some(from), Some(to)) = (filter.from, filter.to) {
        if from > to {
            return Err(DiaryError::invalid(format!(
                "from_date {} is after to_date {}",
                from, to
            )));
        }
    }
    let meals = state.store.list(patient_id, filter).await?;
    debug!(%patient_id, count = meals.len(), "meals listed");
    Ok(meals)
}

pub async fn delete_meal(state: &AppState, patient_id: Uuid, meal_id: Uuid) -> Result<(), DiaryError> {
    state.store.delete(patient_id, meal_id).await?;
    info!(%patient_id, %meal_id, "meal deleted");
    Ok(())
}

pub async fn daily_summary(
    state: &AppState,
    patient_id: Uuid,
    date: Option<Date>,
) -> Result<DailySummary, DiaryError> {
    let date = date.unwrap_or_else(|| now_utc().0);
    let meals = state.store.list(patient_id, MealFilter::on(date)).await?;
    Ok(DailySummary::from_meals(date, &meals))
}

pub async fn time_slots(state: &AppState) -> Result<Arc<[MealTimeSlot]>, DiaryError> {
    Ok(state.classifier.slots().await?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn meal_ids_must_be_canonical() {
        let id = Uuid::new_v4();
        assert_eq!(parse_meal_id(&id.to_string()).unwrap(), id);
        assert!(parse_meal_id("not-a-uuid").is_err());
        assert!(parse_meal_id(&id.simple().to_string()).is_err());
        assert!(parse_meal_id("").is_err());
    }
}
