mod chains;
mod helpers;
mod push;
