use std::collections::HashMap;

use anyhow::Context;
use async_trait::async_trait;
use sqlx::{PgExecutor, PgPool, Postgres, QueryBuilder, Transaction};
use uuid::Uuid;

use crate::error::DiaryError;

use super::{
    classifier::{MealTimeSlot, SlotSource},
    dto::DishIn,
    repo_types::{Dish, Meal, MealChanges, MealFilter, MealRow, NewMeal, SlotRow},
};

/// Persistence for meals and their dishes. Every call is scoped to one patient;
/// a meal owned by someone else behaves exactly like a missing one.
#[async_trait]
pub trait MealStore: Send + Sync {
    /// Inserts the meal and all of its dishes atomically.
    async fn create(&self, patient_id: Uuid, meal: NewMeal) -> Result<Meal, DiaryError>;

    /// Applies the sparse changes and, if present, replaces the dish set, atomically.
    async fn update(
        &self,
        patient_id: Uuid,
        meal_id: Uuid,
        changes: MealChanges,
    ) -> Result<Meal, DiaryError>;

    async fn get(&self, patient_id: Uuid, meal_id: Uuid) -> Result<Meal, DiaryError>;

    /// Newest first: by date, then by time, both descending.
    async fn list(&self, patient_id: Uuid, filter: MealFilter) -> Result<Vec<Meal>, DiaryError>;

    async fn delete(&self, patient_id: Uuid, meal_id: Uuid) -> Result<(), DiaryError>;
}

#[derive(Clone)]
pub struct PgMealStore {
    db: PgPool,
}

impl PgMealStore {
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }
}

#[async_trait]
impl MealStore for PgMealStore {
    async fn create(&self, patient_id: Uuid, meal: NewMeal) -> Result<Meal, DiaryError> {
        let mut tx = self.db.begin().await?;

        let row = sqlx::query_as::<_, MealRow>(
            r#"
            INSERT INTO meals (id, patient_id, meal_type, meal_date, meal_time, portion_size, description)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            RETURNING id, patient_id, meal_type, meal_date, meal_time, portion_size,
                      description, created_at, updated_at
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(patient_id)
        .bind(meal.meal_type.as_str())
        .bind(meal.meal_date)
        .bind(meal.meal_time)
        .bind(&meal.portion_size)
        .bind(&meal.description)
        .fetch_one(&mut *tx)
        .await?;

        let dishes = insert_dishes_tx(&mut tx, row.id, &meal.dishes).await?;
        tx.commit().await?;

        Ok(row.into_meal(dishes)?)
    }

    async fn update(
        &self,
        patient_id: Uuid,
        meal_id: Uuid,
        changes: MealChanges,
    ) -> Result<Meal, DiaryError> {
        let mut tx = self.db.begin().await?;

        let current = sqlx::query_as::<_, MealRow>(
            r#"
            SELECT id, patient_id, meal_type, meal_date, meal_time, portion_size,
                   description, created_at, updated_at
              FROM meals
             WHERE id = $1 AND patient_id = $2
             FOR UPDATE
            "#,
        )
        .bind(meal_id)
        .bind(patient_id)
        .fetch_optional(&mut *tx)
        .await?
        .ok_or_else(|| DiaryError::meal_not_found(meal_id))?;

        let mut meal = current.into_meal(Vec::new())?;
        changes.apply_scalars(&mut meal);

        let row = sqlx::query_as::<_, MealRow>(
            r#"
            UPDATE meals
               SET meal_type = $3, meal_date = $4, meal_time = $5,
                   portion_size = $6, description = $7, updated_at = now()
             WHERE id = $1 AND patient_id = $2
            RETURNING id, patient_id, meal_type, meal_date, meal_time, portion_size,
                      description, created_at, updated_at
            "#,
        )
        .bind(meal_id)
        .bind(patient_id)
        .bind(meal.meal_type.as_str())
        .bind(meal.meal_date)
        .bind(meal.meal_time)
        .bind(&meal.portion_size)
        .bind(&meal.description)
        .fetch_one(&mut *tx)
        .await?;

        let dishes = match &changes.dishes {
            Some(replacement) => {
                sqlx::query("DELETE FROM dishes WHERE meal_id = $1")
                    .bind(meal_id)
                    .execute(&mut *tx)
                    .await?;
                insert_dishes_tx(&mut tx, meal_id, replacement).await?
            }
            None => dishes_for(&mut *tx, &[meal_id]).await?,
        };
        tx.commit().await?;

        Ok(row.into_meal(dishes)?)
    }

    async fn get(&self, patient_id: Uuid, meal_id: Uuid) -> Result<Meal, DiaryError> {
        let row = sqlx::query_as::<_, MealRow>(
            r#"
            SELECT id, patient_id, meal_type, meal_date, meal_time, portion_size,
                   description, created_at, updated_at
              FROM meals
             WHERE id = $1 AND patient_id = $2
            "#,
        )
        .bind(meal_id)
        .bind(patient_id)
        .fetch_optional(&self.db)
        .await?
        .ok_or_else(|| DiaryError::meal_not_found(meal_id))?;

        let dishes = dishes_for(&self.db, &[meal_id]).await?;
        Ok(row.into_meal(dishes)?)
    }

    async fn list(&self, patient_id: Uuid, filter: MealFilter) -> Result<Vec<Meal>, DiaryError> {
        let mut qb = QueryBuilder::<Postgres>::new(
            "SELECT id, patient_id, meal_type, meal_date, meal_time, portion_size, \
             description, created_at, updated_at FROM meals WHERE patient_id = ",
        );
        qb.push_bind(patient_id);
        if let Some(from) = filter.from {
            qb.push(" AND meal_date >= ").push_bind(from);
        }
        if let Some(to) = filter.to {
            qb.push(" AND meal_date <= ").push_bind(to);
        }
        if let Some(meal_type) = filter.meal_type {
            qb.push(" AND meal_type = ").push_bind(meal_type.as_str());
        }
        qb.push(" ORDER BY meal_date DESC, meal_time DESC");

        let rows = qb.build_query_as::<MealRow>().fetch_all(&self.db).await?;
        let ids: Vec<Uuid> = rows.iter().map(|r| r.id).collect();

        let mut by_meal: HashMap<Uuid, Vec<Dish>> = HashMap::new();
        for dish in dishes_for(&self.db, &ids).await? {
            by_meal.entry(dish.meal_id).or_default().push(dish);
        }

        rows.into_iter()
            .map(|row| {
                let dishes = by_meal.remove(&row.id).unwrap_or_default();
                row.into_meal(dishes).map_err(DiaryError::from)
            })
            .collect()
    }

    async fn delete(&self, patient_id: Uuid, meal_id: Uuid) -> Result<(), DiaryError> {
        let mut tx = self.db.begin().await?;
        // Contention surfaces as 55P03 (busy) instead of blocking the request.
        sqlx::query("SET LOCAL lock_timeout = '2s'")
            .execute(&mut *tx)
            .await?;

        let deleted = sqlx::query("DELETE FROM meals WHERE id = $1 AND patient_id = $2")
            .bind(meal_id)
            .bind(patient_id)
            .execute(&mut *tx)
            .await?
            .rows_affected();
        if deleted == 0 {
            return Err(DiaryError::meal_not_found(meal_id));
        }
        tx.commit().await?;
        Ok(())
    }
}

#[async_trait]
impl SlotSource for PgMealStore {
    async fn load_slots(&self) -> anyhow::Result<Vec<MealTimeSlot>> {
        let rows = sqlx::query_as::<_, SlotRow>(
            r#"
            SELECT meal_type, start_hour, end_hour
              FROM meal_time_slots
             ORDER BY start_hour ASC
            "#,
        )
        .fetch_all(&self.db)
        .await
        .context("load meal time slots")?;

        rows.into_iter().map(MealTimeSlot::try_from).collect()
    }
}

/// Bulk-inserts dishes inside the caller's transaction, keeping submission order.
async fn insert_dishes_tx(
    tx: &mut Transaction<'_, Postgres>,
    meal_id: Uuid,
    dishes: &[DishIn],
) -> Result<Vec<Dish>, DiaryError> {
    if dishes.is_empty() {
        return Ok(Vec::new());
    }

    let mut qb = QueryBuilder::<Postgres>::new(
        "INSERT INTO dishes (id, meal_id, position, name, weight, calories, protein, fat, \
         carbohydrates, score, description) ",
    );
    qb.push_values(dishes.iter().enumerate(), |mut b, (position, dish)| {
        b.push_bind(Uuid::new_v4())
            .push_bind(meal_id)
            .push_bind(position as i32)
            .push_bind(dish.name.clone())
            .push_bind(dish.weight)
            .push_bind(dish.calories)
            .push_bind(dish.protein)
            .push_bind(dish.fat)
            .push_bind(dish.carbohydrates)
            .push_bind(dish.score)
            .push_bind(dish.description.clone());
    });
    qb.push(
        " RETURNING id, meal_id, position, name, weight, calories, protein, fat, \
         carbohydrates, score, description, created_at, updated_at",
    );

    let mut rows = qb.build_query_as::<Dish>().fetch_all(&mut **tx).await?;
    rows.sort_by_key(|d| d.position);
    Ok(rows)
}

/// Dishes of the given meals, most recent first; same-batch dishes keep their order.
async fn dishes_for<'e, E>(executor: E, meal_ids: &[Uuid]) -> Result<Vec<Dish>, sqlx::Error>
where
    E: PgExecutor<'e>,
{
    if meal_ids.is_empty() {
        return Ok(Vec::new());
    }
    sqlx::query_as::<_, Dish>(
        r#"
        SELECT id, meal_id, position, name, weight, calories, protein, fat,
               carbohydrates, score, description, created_at, updated_at
          FROM dishes
         WHERE meal_id = ANY($1)
         ORDER BY created_at DESC, position ASC
        "#,
    )
    .bind(meal_ids)
    .fetch_all(executor)
    .await
}
