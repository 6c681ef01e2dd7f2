pub mod stockholm;
