pub mod time;
pub mod geo;

pub use time::now_millis;
pub use geo::{haversine_miles, GeoCoordinate, EARTH_RADIUS_MILES};
