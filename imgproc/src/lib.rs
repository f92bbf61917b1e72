pub mod convolve;

pub use convolve::{convolve, convolve_par, Kernel};
