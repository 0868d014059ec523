pub use self::resample::*;

mod resample;
