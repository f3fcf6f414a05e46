pub mod color;
pub mod expression;
pub mod layer;
