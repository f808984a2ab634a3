//! Preprocessing: table encoding, numeric transforms and categorical encoders.
pub mod encoding;
pub mod numeric;
pub mod tabular;

pub use encoding::{LabelEncoder, OneHotEncoder};
pub use numeric::{NumericTransformer, Scaler};
pub use tabular::{preprocess, FittedPreprocessor, PreparedData};
