pub mod figure;
pub mod history;
pub mod stock;
pub mod variant;

pub use figure::Figure;
pub use stock::{StockRecord, VariantScores};
pub use variant::Variant;
