pub mod activate;
pub mod checkout;
pub mod generate;
pub mod verify;
