pub mod category;
pub mod error;
pub mod fuzzy;
pub mod invoice;
pub mod normalize;
pub mod payment;
pub mod response;
pub mod validate;

pub use category::ExpenseCategory;
pub use error::SchemaError;
pub use invoice::{ExpenseItem, FuelInfo, FuelType, InvoiceData};
pub use payment::PaymentMethod;
pub use response::{ErrorDetails, ExtractionRequest, ExtractionResponse, ResponseStatus};
pub use validate::SchemaValidator;
