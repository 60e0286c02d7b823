pub mod raster;
pub mod shapes;
