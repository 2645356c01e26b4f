mod facts;

pub use facts::FactRepository;
