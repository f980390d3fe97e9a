use serde::{Deserialize, Serialize};

/// What a [`HarvestTarget`] page lists.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TargetKind {
    /// The marketplace's category index for one city.
    Category,
    /// Merchants listed under one category.
    RestaurantList,
    /// Menu items offered by one merchant.
    ProductList,
}

impl TargetKind {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            TargetKind::Category => "category",
            TargetKind::RestaurantList => "restaurant_list",
            TargetKind::ProductList => "product_list",
        }
    }
}

impl std::fmt::Display for TargetKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One unit of work for the orchestrator. Immutable once built.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HarvestTarget {
    pub kind: TargetKind,
    pub url: String,
    pub display_name: String,
    pub city: String,
    /// Persisted owner of the records this target yields: the category id
    /// for merchant lists, the merchant id for item lists.
    pub parent_id: Option<i64>,
}

impl HarvestTarget {
    #[must_use]
    pub fn new(
        kind: TargetKind,
        url: impl Into<String>,
        display_name: impl Into<String>,
        city: impl Into<String>,
    ) -> Self {
        Self {
            kind,
            url: url.into(),
            display_name: display_name.into(),
            city: city.into(),
            parent_id: None,
        }
    }

    #[must_use]
    pub fn with_parent(mut self, parent_id: i64) -> Self {
        self.parent_id = Some(parent_id);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kind_serializes_snake_case() {
        let json = serde_json::to_string(&TargetKind::RestaurantList).unwrap();
        assert_eq!(json, "\"restaurant_list\"");
        assert_eq!(TargetKind::ProductList.to_string(), "product_list");
    }

    #[test]
    fn with_parent_sets_owner() {
        let target = HarvestTarget::new(
            TargetKind::ProductList,
            "https://www.ifood.com.br/delivery/birigui-sp/pizzaria-x",
            "Pizzaria X",
            "Birigui",
        )
        .with_parent(42);
        assert_eq!(target.parent_id, Some(42));
        assert_eq!(target.display_name, "Pizzaria X");
    }
}
