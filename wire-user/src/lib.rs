pub mod config;
pub mod login;

// A user is nothing more than a name and an argon2 hash:
// the daemons only need to say yes or no to a password.
