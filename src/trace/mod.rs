pub mod km_markers;
pub mod linear_ref;
pub mod main_line;
pub mod optimizer;
