pub mod imagej;
pub mod lut;
pub mod metadata;
pub mod plane_io;
