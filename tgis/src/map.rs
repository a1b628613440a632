use std::{collections::BTreeSet, fmt, str::FromStr};

use async_trait::async_trait;
use chrono::NaiveDateTime;
use futures::io::{AsyncRead, AsyncWrite};

use crate::{
    dataset::{DatasetId, DatasetType},
    errors::{Error, Result},
    extio::{ExtendedAsyncRead, ExtendedAsyncWrite, Serialize},
    node::{self, Node},
    time::{TemporalExtent, TemporalType},
};

/// The kinds of map that can be registered.
///
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum MapType {
    Raster,
    Raster3d,
    Vector,
}

impl MapType {
    /// The type of space time dataset that holds maps of this type
    pub fn dataset_type(self) -> DatasetType {
        match self {
            MapType::Raster => DatasetType::Strds,
            MapType::Raster3d => DatasetType::Str3ds,
            MapType::Vector => DatasetType::Stvds,
        }
    }
}

impl fmt::Display for MapType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            MapType::Raster => "raster",
            MapType::Raster3d => "raster_3d",
            MapType::Vector => "vector",
        };

        write!(f, "{name}")
    }
}

impl FromStr for MapType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "raster" | "rast" => Ok(MapType::Raster),
            "raster_3d" | "raster3d" | "rast3d" => Ok(MapType::Raster3d),
            "vector" | "vect" => Ok(MapType::Vector),
            _ => Err(Error::validation(format!("unknown map type <{s}>"))),
        }
    }
}

impl TryFrom<u8> for MapType {
    type Error = Error;

    fn try_from(code: u8) -> Result<Self> {
        match code {
            0 => Ok(MapType::Raster),
            1 => Ok(MapType::Raster3d),
            2 => Ok(MapType::Vector),
            _ => Err(Error::Corrupt(format!("bad map type: {code}"))),
        }
    }
}

/// Split a possibly qualified name, "name@mapset", into its parts.
///
pub fn split_name(s: &str) -> (&str, Option<&str>) {
    match s.split_once('@') {
        Some((name, mapset)) => (name, Some(mapset)),
        None => (s, None),
    }
}

/// The fully qualified identity of a map.
///
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MapId {
    pub name: String,
    pub mapset: String,
}

impl MapId {
    pub fn new<N: Into<String>, M: Into<String>>(name: N, mapset: M) -> Self {
        Self {
            name: name.into(),
            mapset: mapset.into(),
        }
    }
}

impl fmt::Display for MapId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.name, self.mapset)
    }
}

impl FromStr for MapId {
    type Err = Error;

    /// Only fully qualified names can be parsed directly. Unqualified names have to be resolved
    /// against a `Context`.
    fn from_str(s: &str) -> Result<Self> {
        match split_name(s.trim()) {
            (name, Some(mapset)) if !name.is_empty() && !mapset.is_empty() => {
                Ok(MapId::new(name, mapset))
            }
            _ => Err(Error::validation(format!(
                "<{s}> is not a fully qualified map name"
            ))),
        }
    }
}

#[async_trait]
impl Serialize for MapId {
    async fn write_to(&self, stream: &mut (impl AsyncWrite + Unpin + Send)) -> Result<()> {
        stream.write_str(&self.name).await?;
        stream.write_str(&self.mapset).await?;

        Ok(())
    }

    async fn read_from(stream: &mut (impl AsyncRead + Unpin + Send)) -> Result<Self> {
        let name = stream.read_str().await?;
        let mapset = stream.read_str().await?;

        Ok(MapId { name, mapset })
    }
}

/// A map as known to the temporal database.
///
/// `creator` and `ctime` describe the underlying data object, never the user who registered it.
/// `datasets` lists every space time dataset the map is a member of.
///
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MapRecord {
    pub id: MapId,
    pub map_type: MapType,
    pub temporal: Option<TemporalExtent>,
    pub creator: String,
    pub ctime: NaiveDateTime,
    pub datasets: BTreeSet<DatasetId>,
}

impl MapRecord {
    pub fn temporal_type(&self) -> Option<TemporalType> {
        self.temporal.as_ref().map(TemporalExtent::temporal_type)
    }
}

#[async_trait]
impl Node for MapRecord {
    const NODE_TYPE: u8 = node::NODE_MAP;

    async fn save_to(&self, stream: &mut (impl AsyncWrite + Unpin + Send)) -> Result<()> {
        stream.write_byte(self.map_type as u8).await?;
        self.id.write_to(stream).await?;
        match &self.temporal {
            Some(temporal) => {
                stream.write_byte(1).await?;
                temporal.write_to(stream).await?;
            }
            None => {
                stream.write_byte(0).await?;
            }
        }
        stream.write_str(&self.creator).await?;
        stream.write_datetime(&self.ctime).await?;
        stream.write_u32(self.datasets.len() as u32).await?;
        for dataset in &self.datasets {
            dataset.write_to(stream).await?;
        }

        Ok(())
    }

    async fn load_from(stream: &mut (impl AsyncRead + Unpin + Send)) -> Result<Self> {
        let map_type = MapType::try_from(stream.read_byte().await?)?;
        let id = MapId::read_from(stream).await?;
        let temporal = match stream.read_byte().await? {
            0 => None,
            _ => Some(TemporalExtent::read_from(stream).await?),
        };
        let creator = stream.read_str().await?;
        let ctime = stream.read_datetime().await?;
        let n_datasets = stream.read_u32().await?;
        let mut datasets = BTreeSet::new();
        for _ in 0..n_datasets {
            datasets.insert(DatasetId::read_from(stream).await?);
        }

        Ok(MapRecord {
            id,
            map_type,
            temporal,
            creator,
            ctime,
            datasets,
        })
    }
}
