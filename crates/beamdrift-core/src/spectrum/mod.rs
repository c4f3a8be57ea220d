pub mod fft;
pub mod shells;

pub use fft::{fft2d, ifft2d, shift_spectrum, signed_frequency, Spectrum};
pub use shells::{normalize_movie, power_spectrum, shell_count, shell_index};
