use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::get,
    Json, Router,
};
use tracing::instrument;

use crate::{
    auth::{Capability, Patient},
    error::DiaryError,
    extract::{ApiJson, ApiQuery},
    state::AppState,
};

use super::{
    aggregate::DailySummary,
    classifier::MealTimeSlot,
    dto::{
        AppliedFilters, DeleteQuery, DeletedResponse, Envelope, HistoryQuery, ListQuery,
        MealCreateIn, MealListResponse, MealOut, MealUpdateIn, SummaryQuery,
    },
    meal_type::Lang,
    repo_types::{Meal, MealFilter},
    services,
};

// Static segments and `/:id` live in one router so `/history` never parses as an id.
pub fn routes() -> Router<AppState> {
    Router::new()
        .route(
            "/",
            get(list_meals)
                .post(create_meal)
                .put(update_meal)
                .delete(delete_meal),
        )
        .route("/history", get(meal_history))
        .route("/summary", get(daily_summary))
        .route("/slots", get(time_slots))
        .route("/:id", get(get_meal))
}

fn list_response(meals: Vec<Meal>, filter: &MealFilter, lang: Lang) -> MealListResponse {
    let data: Vec<MealOut> = meals
        .into_iter()
        .map(|m| MealOut::present(m, lang))
        .collect();
    MealListResponse {
        success: true,
        count: data.len(),
        data,
        filters: AppliedFilters::describe(filter),
    }
}

#[instrument(skip(state, patient, body), fields(patient_id = %patient.id))]
pub async fn create_meal(
    State(state): State<AppState>,
    patient: Patient,
    lang: Lang,
    ApiJson(body): ApiJson<MealCreateIn>,
) -> Result<(StatusCode, Json<Envelope<MealOut>>), DiaryError> {
    patient.require(Capability::CreateMeals)?;
    let meal = services::create_meal(&state, patient.id, body).await?;
    Ok((
        StatusCode::CREATED,
        Json(Envelope::with_message(
            "Meal created successfully",
            MealOut::present(meal, lang),
        )),
    ))
}

#[instrument(skip(state, patient, body), fields(patient_id = %patient.id, meal_id = %body.id))]
pub async fn update_meal(
    State(state): State<AppState>,
    patient: Patient,
    lang: Lang,
    ApiJson(body): ApiJson<MealUpdateIn>,
) -> Result<Json<Envelope<MealOut>>, DiaryError> {
    patient.require(Capability::EditMeals)?;
    let meal = services::update_meal(&state, patient.id, body).await?;
    Ok(Json(Envelope::with_message(
        "Meal updated successfully",
        MealOut::present(meal, lang),
    )))
}

#[instrument(skip(state, patient), fields(patient_id = %patient.id))]
pub async fn get_meal(
    State(state): State<AppState>,
    patient: Patient,
    lang: Lang,
    Path(id): Path<String>,
) -> Result<Json<Envelope<MealOut>>, DiaryError> {
    patient.require(Capability::ViewMeals)?;
    let meal_id = services::parse_meal_id(&id)?;
    let meal = services::get_meal(&state, patient.id, meal_id).await?;
    Ok(Json(Envelope::data(MealOut::present(meal, lang))))
}

#[instrument(skip(state, patient), fields(patient_id = %patient.id))]
pub async fn list_meals(
    State(state): State<AppState>,
    patient: Patient,
    lang: Lang,
    ApiQuery(q): ApiQuery<ListQuery>,
) -> Result<Json<MealListResponse>, DiaryError> {
    patient.require(Capability::ViewMeals)?;
    let filter = q.filter();
    let meals = services::list_meals(&state, patient.id, filter).await?;
    Ok(Json(list_response(meals, &filter, lang)))
}

#[instrument(skip(state, patient), fields(patient_id = %patient.id))]
pub async fn meal_history(
    State(state): State<AppState>,
    patient: Patient,
    lang: Lang,
    ApiQuery(q): ApiQuery<HistoryQuery>,
) -> Result<Json<MealListResponse>, DiaryError> {
    patient.require(Capability::ViewMeals)?;
    let filter = q.filter();
    let meals = services::list_meals(&state, patient.id, filter).await?;
    Ok(Json(list_response(meals, &filter, lang)))
}

#[instrument(skip(state, patient), fields(patient_id = %patient.id))]
pub async fn delete_meal(
    State(state): State<AppState>,
    patient: Patient,
    ApiQuery(q): ApiQuery<DeleteQuery>,
) -> Result<Json<DeletedResponse>, DiaryError> {
    patient.require(Capability::DeleteMeals)?;
    let meal_id = services::parse_meal_id(&q.meal_id)?;
    services::delete_meal(&state, patient.id, meal_id).await?;
    Ok(Json(DeletedResponse {
        success: true,
        message: "Meal deleted successfully",
        deleted_id: meal_id,
    }))
}

#[instrument(skip(state, patient), fields(patient_id = %patient.id))]
pub async fn daily_summary(
    State(state): State<AppState>,
    patient: Patient,
    ApiQuery(q): ApiQuery<SummaryQuery>,
) -> Result<Json<Envelope<DailySummary>>, DiaryError> {
    patient.require(Capability::ViewMeals)?;
    let summary = services::daily_summary(&state, patient.id, q.date).await?;
    Ok(Json(Envelope::data(summary)))
}

#[instrument(skip(state, patient), fields(patient_id = %patient.id))]
pub async fn time_slots(
    State(state): State<AppState>,
    patient: Patient,
) -> Result<Json<Envelope<Vec<MealTimeSlot>>>, DiaryError> {
    patient.require(Capability::ViewMeals)?;
    let slots = services::time_slots(&state).await?;
    Ok(Json(Envelope::data(slots.to_vec())))
}
