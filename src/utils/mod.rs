pub mod datastore;
pub mod random;
