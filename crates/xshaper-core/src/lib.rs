#[cfg(target_os = "linux")]
pub mod sys;
#[cfg(target_os = "linux")]
pub mod umem;
#[cfg(target_os = "linux")]
pub mod ring;
