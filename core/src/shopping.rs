use std::collections::{BTreeMap, HashSet};

use anyhow::Result;
use serde::Serialize;

use crate::catalog::Catalog;
use crate::db::Database;
use crate::models::Category;

/// Items to buy, grouped by where they are stored. All four categories are
/// always present, in `Category` order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ShoppingList {
    pub items: BTreeMap<Category, Vec<String>>,
}

impl ShoppingList {
    fn empty() -> Self {
        Self {
            items: Category::ALL.into_iter().map(|c| (c, Vec::new())).collect(),
        }
    }

    #[must_use]
    pub fn get(&self, category: Category) -> &[String] {
        self.items
            .get(&category)
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    /// Categories that have at least one item, for display.
    pub fn non_empty(&self) -> impl Iterator<Item = (Category, &[String])> {
        self.items
            .iter()
            .filter(|(_, items)| !items.is_empty())
            .map(|(c, items)| (*c, items.as_slice()))
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.items.values().all(Vec::is_empty)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.items.values().map(Vec::len).sum()
    }
}

pub struct ShoppingListBuilder<'a> {
    catalog: Catalog<'a>,
}

impl<'a> ShoppingListBuilder<'a> {
    #[must_use]
    pub fn new(db: &'a Database) -> Self {
        Self {
            catalog: Catalog::new(db),
        }
    }

    /// Collect the ingredients of the given meals as `"name (quantity)"`.
    ///
    /// Repeated ids count once; unknown ids add nothing. The same ingredient
    /// used by two meals appears twice, once per meal.
    pub fn build(&self, meal_ids: &[i64]) -> Result<ShoppingList> {
        let mut list = ShoppingList::empty();
        let mut seen = HashSet::new();
        for &meal_id in meal_ids {
            if !seen.insert(meal_id) {
                continue;
            }
            for line in self.catalog.ingredients_for(meal_id)? {
                list.items
                    .entry(line.category)
                    .or_default()
                    .push(format!("{} ({})", line.ingredient_name, line.quantity));
            }
        }
        Ok(list)
    }
}
