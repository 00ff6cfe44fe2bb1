pub mod bucket_list;
pub mod bucket_record;
