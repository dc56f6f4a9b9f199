pub mod expiration_sweep;
