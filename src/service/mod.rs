//! CRUD orchestration over the entity store.

mod crud;
pub mod includes;
pub mod representation;
mod validation;

pub use crud::CrudService;
pub use validation::RequestValidator;
