pub mod prelude;

pub mod items;
