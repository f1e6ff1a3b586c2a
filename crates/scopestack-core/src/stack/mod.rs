pub mod illumination;
pub mod projection;
