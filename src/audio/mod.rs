pub mod bands;
pub mod beat;
pub mod capture;
pub mod decode;
pub mod envelope;
pub mod live;
pub mod stats;
