mod generate_id;
mod sort_name;

pub use generate_id::{generate_id, movie_id};
pub use sort_name::make_sort_name;
