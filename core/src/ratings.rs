use anyhow::Result;
use serde::Serialize;

use crate::catalog::Catalog;
use crate::db::Database;
use crate::models::{Meal, Member, PerMember, mean};

/// Averages at or above this count as a meal someone likes.
pub const HIGH_RATING: f64 = 4.0;
/// Averages below this count as a meal someone dislikes.
pub const DISLIKE_BELOW: f64 = 3.0;

/// A meal together with how each member has rated it across every rated
/// history entry.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MealRatings {
    pub meal: Meal,
    pub average: PerMember<Option<f64>>,
    pub count: PerMember<i64>,
}

impl MealRatings {
    /// Mean of the per-member averages that exist.
    #[must_use]
    pub fn overall_average(&self) -> Option<f64> {
        let given: Vec<f64> = self.average.iter().filter_map(|(_, a)| *a).collect();
        mean(&given)
    }

    #[must_use]
    pub fn is_unrated(&self) -> bool {
        self.count.iter().all(|(_, n)| *n == 0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RatingFilter {
    #[default]
    All,
    HighlyRated,
    ByMember(Member),
    Unrated,
    ExcludeDislikedBy(Member),
}

impl RatingFilter {
    /// Parse a filter name such as `highly-rated` or `by-member:kayla`.
    /// Anything unrecognised, including an unknown member, means no filter.
    #[must_use]
    pub fn parse(s: &str) -> Self {
        let s = s.trim();
        let (kind, arg) = match s.split_once(':') {
            Some((kind, arg)) => (kind, Some(arg)),
            None => (s, None),
        };
        let member = arg.and_then(|a| a.parse::<Member>().ok());
        match (kind.to_ascii_lowercase().as_str(), member) {
            ("highly-rated", _) => RatingFilter::HighlyRated,
            ("unrated", _) => RatingFilter::Unrated,
            ("by-member", Some(m)) => RatingFilter::ByMember(m),
            ("exclude-disliked-by", Some(m)) => RatingFilter::ExcludeDislikedBy(m),
            _ => RatingFilter::All,
        }
    }

    #[must_use]
    pub fn matches(self, meal: &MealRatings) -> bool {
        match self {
            RatingFilter::All => true,
            RatingFilter::HighlyRated => meal.overall_average().is_some_and(|a| a >= HIGH_RATING),
            RatingFilter::ByMember(m) => meal.average.get(m).is_some_and(|a| a >= HIGH_RATING),
            RatingFilter::Unrated => meal.is_unrated(),
            RatingFilter::ExcludeDislikedBy(m) => {
                *meal.count.get(m) == 0 || meal.average.get(m).is_some_and(|a| a >= DISLIKE_BELOW)
            }
        }
    }

    /// Keep the meals this filter matches, in their original order.
    #[must_use]
    pub fn apply(self, meals: Vec<MealRatings>) -> Vec<MealRatings> {
        meals.into_iter().filter(|m| self.matches(m)).collect()
    }
}

pub struct RatingAggregator<'a> {
    db: &'a Database,
}

impl<'a> RatingAggregator<'a> {
    #[must_use]
    pub fn new(db: &'a Database) -> Self {
        Self { db }
    }

    /// Every meal in id order with per-member averages and counts over its
    /// rated history. Unrated entries never contribute.
    pub fn meals_with_ratings(&self) -> Result<Vec<MealRatings>> {
        let mut stmt = self.db.conn().prepare(
            "SELECT m.id, m.name, m.instructions,
                    m.brad_liked, m.kayla_liked, m.skylar_liked, m.aubrey_liked,
                    AVG(h.brad_rating), AVG(h.kayla_rating), AVG(h.skylar_rating), AVG(h.aubrey_rating),
                    COUNT(h.brad_rating), COUNT(h.kayla_rating), COUNT(h.skylar_rating), COUNT(h.aubrey_rating)
             FROM meals m
             LEFT JOIN meal_history h ON h.meal_id = m.id AND h.status = 'rated'
             GROUP BY m.id
             ORDER BY m.id",
        )?;
        let rows = stmt
            .query_map([], |row| {
                Ok(MealRatings {
                    meal: Catalog::meal_from_row(row)?,
                    average: PerMember {
                        brad: row.get(7)?,
                        kayla: row.get(8)?,
                        skylar: row.get(9)?,
                        aubrey: row.get(10)?,
                    },
                    count: PerMember {
                        brad: row.get(11)?,
                        kayla: row.get(12)?,
                        skylar: row.get(13)?,
                        aubrey: row.get(14)?,
                    },
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    pub fn filtered(&self, filter: RatingFilter) -> Result<Vec<MealRatings>> {
        Ok(filter.apply(self.meals_with_ratings()?))
    }
}
