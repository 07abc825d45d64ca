//! Read side: decoded bars for one series.

use crate::{
    bar::Bar,
    error::Result,
    key::{DEFAULT_ATTRIBUTE_GROUP, SeriesKey},
    store::{QueryRequest, SharedStore},
};

pub struct SeriesQuery {
    store: SharedStore,
    attribute_group: String,
}

impl SeriesQuery {
    pub fn new(store: SharedStore) -> Self {
        Self {
            store,
            attribute_group: DEFAULT_ATTRIBUTE_GROUP.to_string(),
        }
    }

    pub fn with_attribute_group(mut self, group: impl Into<String>) -> Self {
        self.attribute_group = group.into();
        self
    }

    /// Bars of `symbol`/`timeframe` with `start <= epoch <= end`, ascending.
    ///
    /// A series that does not exist yields no bars.
    pub async fn query(
        &self,
        symbol: &str,
        timeframe: &str,
        start: Option<i64>,
        end: Option<i64>,
    ) -> Result<Vec<Bar>> {
        let key = SeriesKey::resolve_in(symbol, timeframe, &self.attribute_group)?;
        let request = QueryRequest::all(&key).between(start, end);
        match self.store.query(&request).await? {
            Some(rows) => Bar::decode_all(&rows),
            None => Ok(Vec::new()),
        }
    }
}
