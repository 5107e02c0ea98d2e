mod cycle;
mod mock_upstream;
