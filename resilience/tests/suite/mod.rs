mod fan_out;
mod service_calls;
