mod aggregate;
mod config;
mod context;
mod dataset;
mod errors;
mod extio;
mod filter;
mod granularity;
mod helpers;
mod map;
mod mapper;
mod node;
mod register;
mod registry;
mod request;
mod stamp;
mod store;
mod time;
mod timestamp;

#[cfg(test)]
mod testing;

pub use aggregate::summarize;
pub use aggregate::ExtentAggregator;
pub use aggregate::MembershipUpdate;

pub use config::TgisConfig;

pub use context::Context;

pub use dataset::DatasetDefinition;
pub use dataset::DatasetExtent;
pub use dataset::DatasetId;
pub use dataset::DatasetType;
pub use dataset::SpaceTimeDataset;

pub use errors::Error;
pub use errors::Result;

pub use filter::Decision;
pub use filter::EmptyMapFilter;

pub use granularity::absolute_granularity;
pub use granularity::relative_granularity;
pub use granularity::Granularity;

pub use map::MapId;
pub use map::MapRecord;
pub use map::MapType;

pub use mapper::Mapper;
pub use mapper::StoreWrite;

pub use register::Registrar;

pub use registry::Registry;

pub use request::RegistrationRequest;
pub use request::TemporalParams;
pub use request::DEFAULT_SEPARATOR;

pub use stamp::Resolution;
pub use stamp::StampResolver;
pub use stamp::StampSource;
pub use stamp::Stamping;

pub use store::DataStore;
pub use store::History;

pub use time::Increment;
pub use time::TemporalExtent;
pub use time::TemporalType;
pub use time::TimeUnit;

pub use timestamp::format_timestamp;
pub use timestamp::parse_timestamp;
