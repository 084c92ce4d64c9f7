//! I/O operations for reading and writing geospatial data

mod native;
mod vector_io;

pub use native::{
    read_geotiff, read_geotiff_from_buffer, write_geotiff, write_geotiff_to_buffer,
};
pub use vector_io::{parse_geojson, read_features, read_geojson, read_shapefile};
