use std::{sync::Arc, time::Duration};

use async_trait::async_trait;
use serde::Serialize;
use time::Time;
use tracing::{debug, warn};

use super::{cache::TtlCache, meal_type::MealType};

pub const SLOT_CACHE_KEY: &str = "meal_time_slots";

/// Half-open hour range `[start_hour, end_hour)` mapped to a meal type.
/// `start_hour > end_hour` means the range crosses midnight.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct MealTimeSlot {
    pub meal_type: MealType,
    pub start_hour: u8,
    pub end_hour: u8,
}

impl MealTimeSlot {
    pub fn new(meal_type: MealType, start_hour: u8, end_hour: u8) -> Self {
        Self {
            meal_type,
            start_hour,
            end_hour,
        }
    }

    pub fn wraps_midnight(&self) -> bool {
        self.start_hour > self.end_hour
    }

    pub fn contains(&self, hour: u8) -> bool {
        if self.wraps_midnight() {
            hour >= self.start_hour || hour < self.end_hour
        } else {
            self.start_hour <= hour && hour < self.end_hour
        }
    }
}

/// First slot containing `hour` wins; uncovered hours are snacks.
pub fn classify(hour: u8, slots: &[MealTimeSlot]) -> MealType {
    slots
        .iter()
        .find(|slot| slot.contains(hour))
        .map(|slot| slot.meal_type)
        .unwrap_or(MealType::Snack)
}

/// Table seeded by the initial migration.
pub fn default_slots() -> Vec<MealTimeSlot> {
    vec![
        MealTimeSlot::new(MealType::Breakfast, 6, 11),
        MealTimeSlot::new(MealType::Lunch, 11, 16),
        MealTimeSlot::new(MealType::Dinner, 16, 22),
        MealTimeSlot::new(MealType::Snack, 22, 6),
    ]
}

#[async_trait]
pub trait SlotSource: Send + Sync {
    /// Slots in table order.
    async fn load_slots(&self) -> anyhow::Result<Vec<MealTimeSlot>>;
}

#[async_trait]
impl SlotSource for Vec<MealTimeSlot> {
    async fn load_slots(&self) -> anyhow::Result<Vec<MealTimeSlot>> {
        Ok(self.clone())
    }
}

/// Auto-names meals from their time of day, reading the slot table through a TTL cache.
#[derive(Clone)]
pub struct MealClassifier {
    source: Arc<dyn SlotSource>,
    cache: Arc<TtlCache<Arc<[MealTimeSlot]>>>,
}

impl MealClassifier {
    pub fn new(source: Arc<dyn SlotSource>, ttl: Duration) -> Self {
        Self {
            source,
            cache: Arc::new(TtlCache::new(ttl)),
        }
    }

    pub async fn slots(&self) -> anyhow::Result<Arc<[MealTimeSlot]>> {
        if let Some(slots) = self.cache.get(SLOT_CACHE_KEY) {
            return Ok(slots);
        }
        let slots: Arc<[MealTimeSlot]> = self.source.load_slots().await?.into();
        self.cache.insert(SLOT_CACHE_KEY, Arc::clone(&slots));
        debug!(count = slots.len(), ttl_secs = self.cache.ttl().as_secs(), "meal time slots cached");
        Ok(slots)
    }

    pub async fn classify(&self, at: Time) -> MealType {
        match self.slots().await {
            Ok(slots) => classify(at.hour(), &slots),
            Err(e) => {
                warn!(error = ?e, "meal time slots unavailable, falling back to snack");
                MealType::Snack
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use time::macros::time;

    fn day_slots() -> Vec<MealTimeSlot> {
        vec![
            MealTimeSlot::new(MealType::Breakfast, 6, 11),
            MealTimeSlot::new(MealType::Lunch, 11, 16),
            MealTimeSlot::new(MealType::Dinner, 16, 22),
        ]
    }

    #[test]
    fn morning_hour_is_breakfast() {
        let mut slots = day_slots();
        slots.push(MealTimeSlot::new(MealType::Snack, 0, 23));
        assert_eq!(classify(8, &slots), MealType::Breakfast);
    }

    #[test]
    fn uncovered_hour_falls_back_to_snack() {
        let slots = day_slots();
        assert_eq!(classify(23, &slots), MealType::Snack);
        assert_eq!(classify(3, &slots), MealType::Snack);
        assert_eq!(classify(3, &[]), MealType::Snack);
    }

    #[test]
    fn end_hour_is_exclusive() {
        let slots = day_slots();
        assert_eq!(classify(10, &slots), MealType::Breakfast);
        assert_eq!(classify(11, &slots), MealType::Lunch);
        assert_eq!(classify(21, &slots), MealType::Dinner);
    }

    #[test]
    fn wraparound_slot_covers_both_sides_of_midnight() {
        let late = MealTimeSlot::new(MealType::Snack, 22, 6);
        assert!(late.wraps_midnight());
        assert!(late.contains(22));
        assert!(late.contains(23));
        assert!(late.contains(0));
        assert!(late.contains(5));
        assert!(!late.contains(6));
        assert!(!late.contains(12));

        let slots = vec![MealTimeSlot::new(MealType::Dinner, 20, 2)];
        assert_eq!(classify(1, &slots), MealType::Dinner);
    }

    #[test]
    fn first_matching_slot_wins() {
        let slots = vec![
            MealTimeSlot::new(MealType::Snack, 10, 23),
            MealTimeSlot::new(MealType::Lunch, 12, 15),
        ];
        assert_eq!(classify(13, &slots), MealType::Snack);
    }

    struct CountingSource {
        loads: AtomicUsize,
    }

    #[async_trait]
    impl SlotSource for CountingSource {
        async fn load_slots(&self) -> anyhow::Result<Vec<MealTimeSlot>> {
            self.loads.fetch_add(1, Ordering::SeqCst);
            Ok(default_slots())
        }
    }

    #[tokio::test]
    async fn slot_table_is_loaded_once_within_ttl() {
        let source = Arc::new(CountingSource {
            loads: AtomicUsize::new(0),
        });
        let classifier = MealClassifier::new(source.clone(), Duration::from_secs(3600));

        assert_eq!(classifier.classify(time!(8:30)).await, MealType::Breakfast);
        assert_eq!(classifier.classify(time!(13:05)).await, MealType::Lunch);
        assert_eq!(classifier.classify(time!(23:59)).await, MealType::Snack);
        assert_eq!(source.loads.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn zero_ttl_reloads_every_time() {
        let source = Arc::new(CountingSource {
            loads: AtomicUsize::new(0),
        });
        let classifier = MealClassifier::new(source.clone(), Duration::ZERO);

        classifier.classify(time!(8:00)).await;
        classifier.classify(time!(9:00)).await;
        assert_eq!(source.loads.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn table_without_late_snack_falls_back_at_night() {
        let classifier = MealClassifier::new(Arc::new(day_slots()), Duration::from_secs(60));
        assert_eq!(classifier.classify(time!(8:00)).await, MealType::Breakfast);
        assert_eq!(classifier.classify(time!(23:10)).await, MealType::Snack);
        assert_eq!(classifier.slots().await.unwrap().len(), 3);
    }

    struct BrokenSource;

    #[async_trait]
    impl SlotSource for BrokenSource {
        async fn load_slots(&self) -> anyhow::Result<Vec<MealTimeSlot>> {
            anyhow::bail!("database unreachable")
        }
    }

    #[tokio::test]
    async fn unreadable_table_still_yields_a_label() {
        let classifier = MealClassifier::new(Arc::new(BrokenSource), Duration::from_secs(60));
        assert_eq!(classifier.classify(time!(8:00)).await, MealType::Snack);
    }
}
