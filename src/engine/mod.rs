pub mod backup;
pub mod detector;
pub mod placement;
pub mod scanner;
