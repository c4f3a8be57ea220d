pub mod image_io;
pub mod mrc;
pub mod sink;
pub mod tracks;

pub use sink::{
    find_fsc_tables, read_fsc_table, read_motion_shifts, write_fsc_table, DirectorySink,
    StoredShiftsSource,
};
