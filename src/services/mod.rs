pub mod availability_service;
pub mod geo_service;
pub mod matching_service;
pub mod reputation_service;
pub mod taxonomy_service;
