pub mod mock_provider;
pub mod mock_tools;
