use std::{collections::BTreeSet, fmt, str::FromStr};

use async_trait::async_trait;
use chrono::NaiveDateTime;
use futures::{AsyncRead, AsyncWrite};

use crate::{
    errors::{Error, Result},
    extio::{ExtendedAsyncRead, ExtendedAsyncWrite, Serialize},
    granularity::Granularity,
    map::{MapId, MapType},
    node::{Node, NODE_DATASET},
    time::{TemporalType, TimeUnit},
};

/// The kinds of space time dataset, one for each kind of map.
///
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum DatasetType {
    Strds,
    Str3ds,
    Stvds,
}

impl DatasetType {
    /// The type of map this dataset holds
    pub fn map_type(self) -> MapType {
        match self {
            DatasetType::Strds => MapType::Raster,
            DatasetType::Str3ds => MapType::Raster3d,
            DatasetType::Stvds => MapType::Vector,
        }
    }
}

impl fmt::Display for DatasetType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            DatasetType::Strds => "strds",
            DatasetType::Str3ds => "str3ds",
            DatasetType::Stvds => "stvds",
        };

        write!(f, "{name}")
    }
}

impl FromStr for DatasetType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "strds" => Ok(DatasetType::Strds),
            "str3ds" => Ok(DatasetType::Str3ds),
            "stvds" => Ok(DatasetType::Stvds),
            _ => Err(Error::validation(format!("unknown space time dataset type <{s}>"))),
        }
    }
}

impl TryFrom<u8> for DatasetType {
    type Error = Error;

    fn try_from(code: u8) -> Result<Self> {
        match code {
            0 => Ok(DatasetType::Strds),
            1 => Ok(DatasetType::Str3ds),
            2 => Ok(DatasetType::Stvds),
            _ => Err(Error::Corrupt(format!("bad dataset type: {code}"))),
        }
    }
}

/// The fully qualified identity of a space time dataset.
///
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DatasetId {
    pub name: String,
    pub mapset: String,
    pub kind: DatasetType,
}

impl DatasetId {
    pub fn new<N: Into<String>, M: Into<String>>(name: N, mapset: M, kind: DatasetType) -> Self {
        Self {
            name: name.into(),
            mapset: mapset.into(),
            kind,
        }
    }
}

impl fmt::Display for DatasetId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.name, self.mapset)
    }
}

#[async_trait]
impl Serialize for DatasetId {
    async fn write_to(&self, stream: &mut (impl AsyncWrite + Unpin + Send)) -> Result<()> {
        stream.write_byte(self.kind as u8).await?;
        stream.write_str(&self.name).await?;
        stream.write_str(&self.mapset).await?;

        Ok(())
    }

    async fn read_from(stream: &mut (impl AsyncRead + Unpin + Send)) -> Result<Self> {
        let kind = DatasetType::try_from(stream.read_byte().await?)?;
        let name = stream.read_str().await?;
        let mapset = stream.read_str().await?;

        Ok(DatasetId { name, mapset, kind })
    }
}

/// The time span covered by the members of a space time dataset.
///
/// Unlike a map's `TemporalExtent` this always has an end, which equals the start for a dataset
/// holding a single instantaneous map.
///
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum DatasetExtent {
    Absolute {
        start: NaiveDateTime,
        end: NaiveDateTime,
    },
    Relative {
        start: i64,
        end: i64,
        unit: TimeUnit,
    },
}

impl DatasetExtent {
    pub fn temporal_type(&self) -> TemporalType {
        match self {
            DatasetExtent::Absolute { .. } => TemporalType::Absolute,
            DatasetExtent::Relative { .. } => TemporalType::Relative,
        }
    }

    pub fn absolute_time(&self) -> Option<(NaiveDateTime, NaiveDateTime)> {
        match self {
            DatasetExtent::Absolute { start, end } => Some((*start, *end)),
            DatasetExtent::Relative { .. } => None,
        }
    }

    pub fn relative_time(&self) -> Option<(i64, i64, TimeUnit)> {
        match self {
            DatasetExtent::Absolute { .. } => None,
            DatasetExtent::Relative { start, end, unit } => Some((*start, *end, *unit)),
        }
    }
}

#[async_trait]
impl Serialize for DatasetExtent {
    async fn write_to(&self, stream: &mut (impl AsyncWrite + Unpin + Send)) -> Result<()> {
        match self {
            DatasetExtent::Absolute { start, end } => {
                stream.write_byte(TemporalType::Absolute as u8).await?;
                stream.write_datetime(start).await?;
                stream.write_datetime(end).await?;
            }
            DatasetExtent::Relative { start, end, unit } => {
                stream.write_byte(TemporalType::Relative as u8).await?;
                stream.write_byte(*unit as u8).await?;
                stream.write_i64(*start).await?;
                stream.write_i64(*end).await?;
            }
        }

        Ok(())
    }

    async fn read_from(stream: &mut (impl AsyncRead + Unpin + Send)) -> Result<Self> {
        let extent = match TemporalType::try_from(stream.read_byte().await?)? {
            TemporalType::Absolute => DatasetExtent::Absolute {
                start: stream.read_datetime().await?,
                end: stream.read_datetime().await?,
            },
            TemporalType::Relative => DatasetExtent::Relative {
                unit: TimeUnit::try_from(stream.read_byte().await?)?,
                start: stream.read_i64().await?,
                end: stream.read_i64().await?,
            },
        };

        Ok(extent)
    }
}

#[async_trait]
impl Serialize for Granularity {
    async fn write_to(&self, stream: &mut (impl AsyncWrite + Unpin + Send)) -> Result<()> {
        stream.write_i64(self.count).await?;
        stream.write_byte(self.unit as u8).await?;

        Ok(())
    }

    async fn read_from(stream: &mut (impl AsyncRead + Unpin + Send)) -> Result<Self> {
        let count = stream.read_i64().await?;
        let unit = TimeUnit::try_from(stream.read_byte().await?)?;

        Ok(Granularity::new(count, unit))
    }
}

/// What a caller supplies to create a new space time dataset.
///
#[derive(Clone, Debug)]
pub struct DatasetDefinition {
    pub name: String,
    pub kind: DatasetType,
    pub temporal_type: TemporalType,
    pub semantic: String,
    pub title: String,
    pub description: String,
}

impl DatasetDefinition {
    pub fn new<S: Into<String>>(name: S, kind: DatasetType, temporal_type: TemporalType) -> Self {
        Self {
            name: name.into(),
            kind,
            temporal_type,
            semantic: String::from("mean"),
            title: String::new(),
            description: String::new(),
        }
    }

    pub fn semantic<S: Into<String>>(mut self, semantic: S) -> Self {
        self.semantic = semantic.into();
        self
    }

    pub fn title<S: Into<String>>(mut self, title: S) -> Self {
        self.title = title.into();
        self
    }

    pub fn description<S: Into<String>>(mut self, description: S) -> Self {
        self.description = description.into();
        self
    }
}

/// A space time dataset: a set of maps of one type, all using the same temporal model.
///
/// `extent` and `granularity` are derived from the full member set every time membership changes.
/// They are `None` while the dataset has no members.
///
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SpaceTimeDataset {
    pub id: DatasetId,
    pub temporal_type: TemporalType,
    pub semantic: String,
    pub title: String,
    pub description: String,
    pub creator: String,
    pub ctime: NaiveDateTime,
    pub members: BTreeSet<MapId>,
    pub extent: Option<DatasetExtent>,
    pub granularity: Option<Granularity>,
}

impl SpaceTimeDataset {
    pub fn new(
        definition: DatasetDefinition,
        mapset: &str,
        creator: &str,
        ctime: NaiveDateTime,
    ) -> Self {
        Self {
            id: DatasetId::new(definition.name, mapset, definition.kind),
            temporal_type: definition.temporal_type,
            semantic: definition.semantic,
            title: definition.title,
            description: definition.description,
            creator: creator.to_string(),
            ctime,
            members: BTreeSet::new(),
            extent: None,
            granularity: None,
        }
    }

    pub fn map_type(&self) -> MapType {
        self.id.kind.map_type()
    }

    /// The relative unit shared by all members, if this is a relative dataset with members
    pub fn unit(&self) -> Option<TimeUnit> {
        self.extent
            .as_ref()
            .and_then(DatasetExtent::relative_time)
            .map(|(_, _, unit)| unit)
    }
}

#[async_trait]
impl Node for SpaceTimeDataset {
    const NODE_TYPE: u8 = NODE_DATASET;

    async fn save_to(&self, stream: &mut (impl AsyncWrite + Unpin + Send)) -> Result<()> {
        self.id.write_to(stream).await?;
        stream.write_byte(self.temporal_type as u8).await?;
        stream.write_str(&self.semantic).await?;
        stream.write_str(&self.title).await?;
        stream.write_str(&self.description).await?;
        stream.write_str(&self.creator).await?;
        stream.write_datetime(&self.ctime).await?;

        stream.write_u32(self.members.len() as u32).await?;
        for member in &self.members {
            member.write_to(stream).await?;
        }

        match &self.extent {
            Some(extent) => {
                stream.write_byte(1).await?;
                extent.write_to(stream).await?;
            }
            None => {
                stream.write_byte(0).await?;
            }
        }

        match &self.granularity {
            Some(granularity) => {
                stream.write_byte(1).await?;
                granularity.write_to(stream).await?;
            }
            None => {
                stream.write_byte(0).await?;
            }
        }

        Ok(())
    }

    async fn load_from(stream: &mut (impl AsyncRead + Unpin + Send)) -> Result<Self> {
        let id = DatasetId::read_from(stream).await?;
        let temporal_type = TemporalType::try_from(stream.read_byte().await?)?;
        let semantic = stream.read_str().await?;
        let title = stream.read_str().await?;
        let description = stream.read_str().await?;
        let creator = stream.read_str().await?;
        let ctime = stream.read_datetime().await?;

        let n_members = stream.read_u32().await?;
        let mut members = BTreeSet::new();
        for _ in 0..n_members {
            members.insert(MapId::read_from(stream).await?);
        }

        let extent = match stream.read_byte().await? {
            0 => None,
            _ => Some(DatasetExtent::read_from(stream).await?),
        };
        let granularity = match stream.read_byte().await? {
            0 => None,
            _ => Some(Granularity::read_from(stream).await?),
        };

        Ok(SpaceTimeDataset {
            id,
            temporal_type,
            semantic,
            title,
            description,
            creator,
            ctime,
            members,
            extent,
            granularity,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::io::Cursor;

    use crate::testing::datetime;

    async fn round_trip(dataset: &SpaceTimeDataset) -> Result<SpaceTimeDataset> {
        let mut buffer: Vec<u8> = Vec::new();
        dataset.save_to(&mut buffer).await?;
        let mut buffer = Cursor::new(buffer);

        SpaceTimeDataset::load_from(&mut buffer).await
    }

    #[test]
    fn test_dataset_type() -> Result<()> {
        assert_eq!("stvds".parse::<DatasetType>()?, DatasetType::Stvds);
        assert!("strvds".parse::<DatasetType>().is_err());
        for kind in [DatasetType::Strds, DatasetType::Str3ds, DatasetType::Stvds] {
            assert_eq!(kind.map_type().dataset_type(), kind);
        }

        Ok(())
    }

    #[tokio::test]
    async fn load_save_empty() -> Result<()> {
        let definition =
            DatasetDefinition::new("precip_abs", DatasetType::Strds, TemporalType::Absolute)
                .title("A test")
            .description("A test with input files");
        let dataset = SpaceTimeDataset::new(
            definition,
            "PERMANENT",
            "soeren",
            datetime(2013, 4, 1, 12, 0, 0),
        );
        assert_eq!(dataset.semantic, "mean");
        assert_eq!(round_trip(&dataset).await?, dataset);

        Ok(())
    }

    #[tokio::test]
    async fn load_save_with_members() -> Result<()> {
        let definition =
            DatasetDefinition::new("register_test_rel", DatasetType::Stvds, TemporalType::Relative)
                .semantic("sum");
        let mut dataset = SpaceTimeDataset::new(
            definition,
            "PERMANENT",
            "soeren",
            datetime(2013, 4, 1, 12, 0, 0),
        );
        dataset.members.insert(MapId::new("lakes", "PERMANENT"));
        dataset.members.insert(MapId::new("roads", "PERMANENT"));
        dataset.extent = Some(DatasetExtent::Relative {
            start: 1000000,
            end: 2000000,
            unit: TimeUnit::Second,
        });
        dataset.granularity = Some(Granularity::new(500000, TimeUnit::Second));

        assert_eq!(dataset.unit(), Some(TimeUnit::Second));
        assert_eq!(dataset.map_type(), MapType::Vector);
        assert_eq!(round_trip(&dataset).await?, dataset);

        Ok(())
    }
}
