/// The average of the motion sample times, for everything that only needs one static value.
pub fn mean_time(times: &[f32]) -> f32 {
    if times.is_empty() {
        return 0.0;
    }

    times.iter().sum::<f32>() / times.len() as f32
}
