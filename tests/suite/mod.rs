mod lock_timer;
mod persistence;
mod scenarios;
