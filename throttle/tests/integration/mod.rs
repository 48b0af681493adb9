mod controller_test;
mod pipeline_test;
