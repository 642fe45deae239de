use std::{convert::Infallible, fmt, str::FromStr};

use axum::{
    async_trait,
    extract::FromRequestParts,
    http::{header::ACCEPT_LANGUAGE, request::Parts},
};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Canonical meal-type label. Every meal carries exactly one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MealType {
    Breakfast,
    Lunch,
    Dinner,
    Snack,
}

#[derive(Debug, Error)]
#[error("unknown meal type `{0}`, expected one of: breakfast, lunch, dinner, snack")]
pub struct UnknownMealType(pub String);

impl MealType {
    pub const ALL: [MealType; 4] = [
        MealType::Breakfast,
        MealType::Lunch,
        MealType::Dinner,
        MealType::Snack,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            MealType::Breakfast => "breakfast",
            MealType::Lunch => "lunch",
            MealType::Dinner => "dinner",
            MealType::Snack => "snack",
        }
    }

    /// Display title for the given language. The only place labels get localized.
    pub fn title(self, lang: Lang) -> &'static str {
        match (lang, self) {
            (Lang::En, MealType::Breakfast) => "Breakfast",
            (Lang::En, MealType::Lunch) => "Lunch",
            (Lang::En, MealType::Dinner) => "Dinner",
            (Lang::En, MealType::Snack) => "Snack",
            (Lang::Ru, MealType::Breakfast) => "Завтрак",
            (Lang::Ru, MealType::Lunch) => "Обед",
            (Lang::Ru, MealType::Dinner) => "Ужин",
            (Lang::Ru, MealType::Snack) => "Перекус",
        }
    }
}

impl fmt::Display for MealType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MealType {
    type Err = UnknownMealType;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        MealType::ALL
            .into_iter()
            .find(|t| t.as_str() == s)
            .ok_or_else(|| UnknownMealType(s.to_string()))
    }
}

/// Response language, picked from `Accept-Language`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Lang {
    #[default]
    En,
    Ru,
}

impl Lang {
    pub fn from_accept_language(header: Option<&str>) -> Self {
        let primary = header
            .and_then(|h| h.split(',').next())
            .and_then(|tag| tag.split(';').next())
            .and_then(|tag| tag.trim().split('-').next())
            .unwrap_or_default();
        if primary.eq_ignore_ascii_case("ru") {
            Lang::Ru
        } else {
            Lang::En
        }
    }
}

#[async_trait]
impl<S> FromRequestParts<S> for Lang
where
    S: Send + Sync,
{
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let header = parts
            .headers
            .get(ACCEPT_LANGUAGE)
            .and_then(|v| v.to_str().ok());
        Ok(Lang::from_accept_language(header))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_canonical_labels_only() {
        assert_eq!("lunch".parse::<MealType>().unwrap(), MealType::Lunch);
        assert!("Lunch".parse::<MealType>().is_err());
        let err = "brunch".parse::<MealType>().unwrap_err();
        assert!(err.to_string().contains("brunch"));
    }

    #[test]
    fn serializes_lowercase() {
        let json = serde_json::to_string(&MealType::Dinner).unwrap();
        assert_eq!(json, "\"dinner\"");
        let back: MealType = serde_json::from_str("\"snack\"").unwrap();
        assert_eq!(back, MealType::Snack);
    }

    #[test]
    fn accept_language_picks_russian_titles() {
        assert_eq!(Lang::from_accept_language(Some("ru-RU,ru;q=0.9,en;q=0.8")), Lang::Ru);
        assert_eq!(Lang::from_accept_language(Some("en-US")), Lang::En);
        assert_eq!(Lang::from_accept_language(Some("de")), Lang::En);
        assert_eq!(Lang::from_accept_language(None), Lang::En);
        assert_eq!(MealType::Breakfast.title(Lang::Ru), "Завтрак");
        assert_eq!(MealType::Snack.title(Lang::En), "Snack");
    }
}
