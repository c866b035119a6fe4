mod session;
mod test_db;
