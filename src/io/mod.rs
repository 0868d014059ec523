pub use self::{
    manifest::load_cohort,
    reference::split_data_line,
    tables::{parameter_header, read_table, write_table},
};

mod manifest;
mod reference;
mod tables;
mod trajectory;
