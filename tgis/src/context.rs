use tracing::{debug, info};

use crate::{
    dataset::{DatasetId, DatasetType},
    errors::{Error, Result},
    map::{split_name, MapId, MapType},
    registry::Registry,
    store::DataStore,
};

/// The workspace a registration runs in: the current mapset, the other mapsets that are
/// readable from it, and the user doing the work.
///
/// Every operation that resolves names takes a `Context` explicitly. Changing mapset goes through
/// `switch_mapset`, after which names have to be resolved again.
///
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Context {
    mapset: String,
    search_path: Vec<String>,
    user: String,
}

impl Context {
    pub fn new<M: Into<String>, U: Into<String>>(mapset: M, user: U) -> Self {
        let mapset = mapset.into();
        Self {
            search_path: vec![mapset.clone()],
            mapset,
            user: user.into(),
        }
    }

    /// Make other mapsets accessible. The current mapset always comes first.
    ///
    pub fn with_search_path<I, S>(mut self, mapsets: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.search_path = build_search_path(&self.mapset, mapsets);
        self
    }

    pub fn current_mapset(&self) -> &str {
        &self.mapset
    }

    /// All mapsets names can be resolved in, current mapset first.
    pub fn accessible_mapsets(&self) -> &[String] {
        &self.search_path
    }

    pub fn is_accessible(&self, mapset: &str) -> bool {
        self.search_path.iter().any(|accessible| accessible == mapset)
    }

    pub fn user(&self) -> &str {
        &self.user
    }

    /// Change the current mapset and search path.
    ///
    /// The previous mapset stays readable only if it is listed in `search_path`.
    ///
    pub fn switch_mapset<M, I, S>(&mut self, mapset: M, search_path: I)
    where
        M: Into<String>,
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mapset = mapset.into();
        self.search_path = build_search_path(&mapset, search_path);
        info!(from = %self.mapset, to = %mapset, "switch mapset");
        self.mapset = mapset;
    }

    /// Resolve a map name against the maps that exist in the data store.
    ///
    pub async fn resolve_map(
        &self,
        store: &dyn DataStore,
        map_type: MapType,
        name: &str,
    ) -> Result<MapId> {
        let (name, mapsets) = self.candidates(map_type_kind(map_type), name)?;
        let mut found = vec![];
        for mapset in mapsets {
            if store.exists(map_type, &MapId::new(name, mapset)).await? {
                found.push(mapset);
                if mapset == self.mapset {
                    break;
                }
            }
        }

        let mapset = self.choose(map_type_kind(map_type), name, found)?;
        Ok(MapId::new(name, mapset))
    }

    /// Resolve a map name against the maps that are registered in the temporal database.
    ///
    pub async fn resolve_registered(
        &self,
        registry: &Registry,
        map_type: MapType,
        name: &str,
    ) -> Result<MapId> {
        let (name, mapsets) = self.candidates(map_type_kind(map_type), name)?;
        let mut found = vec![];
        for mapset in mapsets {
            if registry.map_exists(map_type, &MapId::new(name, mapset)).await? {
                found.push(mapset);
                if mapset == self.mapset {
                    break;
                }
            }
        }

        let mapset = self.choose(map_type_kind(map_type), name, found)?;
        Ok(MapId::new(name, mapset))
    }

    /// Resolve the name of a space time dataset.
    ///
    pub async fn resolve_dataset(
        &self,
        registry: &Registry,
        kind: DatasetType,
        name: &str,
    ) -> Result<DatasetId> {
        let (name, mapsets) = self.candidates("space time dataset", name)?;
        let mut found = vec![];
        for mapset in mapsets {
            if registry
                .dataset_exists(&DatasetId::new(name, mapset, kind))
                .await?
            {
                found.push(mapset);
                if mapset == self.mapset {
                    break;
                }
            }
        }

        let mapset = self.choose("space time dataset", name, found)?;
        Ok(DatasetId::new(name, mapset, kind))
    }

    /// Split a name and list the mapsets to look for it in, current mapset first.
    ///
    fn candidates<'a>(
        &'a self,
        kind: &'static str,
        name: &'a str,
    ) -> Result<(&'a str, Vec<&'a str>)> {
        let (bare, mapset) = split_name(name.trim());
        if bare.is_empty() {
            return Err(Error::validation(format!("empty {kind} name")));
        }

        match mapset {
            Some(mapset) => {
                if !self.is_accessible(mapset) {
                    debug!(name, mapset, "mapset not in search path");
                    return Err(Error::not_found(kind, name));
                }
                Ok((bare, vec![mapset]))
            }
            None => Ok((bare, self.search_path.iter().map(String::as_str).collect())),
        }
    }

    /// A name found in the current mapset wins. Otherwise it must be found in exactly one other
    /// accessible mapset.
    ///
    fn choose<'a>(
        &self,
        kind: &'static str,
        name: &str,
        found: Vec<&'a str>,
    ) -> Result<&'a str> {
        if let Some(mapset) = found.iter().copied().find(|mapset| *mapset == self.mapset) {
            return Ok(mapset);
        }

        match found.as_slice() {
            [] => Err(Error::not_found(kind, name)),
            [mapset] => Ok(*mapset),
            _ => Err(Error::Ambiguous {
                kind,
                name: name.to_string(),
                mapsets: found.iter().map(|mapset| mapset.to_string()).collect(),
            }),
        }
    }
}

fn build_search_path<I, S>(mapset: &str, mapsets: I) -> Vec<String>
where
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    let mut path = vec![mapset.to_string()];
    for mapset in mapsets {
        let mapset = mapset.into();
        if !path.contains(&mapset) {
            path.push(mapset);
        }
    }

    path
}

fn map_type_kind(map_type: MapType) -> &'static str {
    match map_type {
        MapType::Raster => "raster map",
        MapType::Raster3d => "3D raster map",
        MapType::Vector => "vector map",
    }
}
