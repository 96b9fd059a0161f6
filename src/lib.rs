pub mod adjacency;
pub mod assign;
pub mod classification;
pub mod context;
pub mod error;
pub mod heatpump;
pub mod kde;
pub mod load;
pub mod model;
pub mod offgas;
pub mod plotting;
pub mod ruc_spacing;
pub mod spacing;
pub mod summary;
pub mod traits;
pub mod workbook;

pub use adjacency::{build_neighbours, Neighbours};
pub use assign::{
    assign_batched, assign_points, filter_in_chunks, Assignment, FilterReport, PolygonIndex,
};
pub use error::{Error, Result};
pub use model::{AddressPoint, ArealUnit, AssignedPoint};
pub use spacing::{estimate, EstimateReport, NullCause, Spacing, UnitSpacing};
pub use traits::{Plot, Report};
