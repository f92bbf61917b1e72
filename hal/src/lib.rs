pub mod gpu;
pub mod kernels;

pub use gpu::GpuContext;
