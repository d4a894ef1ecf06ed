pub fn min_of_2<T: PartialOrd + Copy>(first: T, second: T) -> T {
    if first < second {
        first
    } else {
        second
    }
}

pub(crate) fn min_of_3<T: PartialOrd + Copy>(first: T, second: T, third: T) -> T {
    let first_min = min_of_2(first, second);
    min_of_2(first_min, third)
}

pub fn max_of_2<T: PartialOrd + Copy>(first: T, second: T) -> T {
    if first > second {
        first
    } else {
        second
    }
}

/// Restrict `value` to the closed interval `[lower, upper]`.
pub(crate) fn clip(value: f64, lower: f64, upper: f64) -> f64 {
    min_of_2(max_of_2(value, lower), upper)
}

/// Largest value of a series, or zero for an empty one.
pub(crate) fn max_of_series(values: &[f64]) -> f64 {
    values.iter().copied().fold(0., max_of_2)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use rstest::*;

    #[rstest]
    #[case(2., 4., 2.)]
    #[case(4., 2., 2.)]
    #[case(-1., 0., -1.)]
    fn should_take_the_smaller_of_two(#[case] first: f64, #[case] second: f64, #[case] expected: f64) {
        assert_eq!(min_of_2(first, second), expected);
    }

    #[rstest]
    fn should_take_the_smallest_of_three() {
        assert_eq!(min_of_3(7, 3, 5), 3);
        assert_eq!(min_of_3(0.5, 1.5, 0.25), 0.25);
    }

    #[rstest]
    fn should_take_the_larger_of_two() {
        assert_eq!(max_of_2(4., 2.), 4.);
        assert_eq!(max_of_2('a', 'b'), 'b');
    }

    #[rstest]
    #[case(30., 0., 20., 20.)]
    #[case(-5., 0., 20., 0.)]
    #[case(12.5, 0., 20., 12.5)]
    fn should_clip_to_interval(
        #[case] value: f64,
        #[case] lower: f64,
        #[case] upper: f64,
        #[case] expected: f64,
    ) {
        assert_eq!(clip(value, lower, upper), expected);
    }

    #[rstest]
    fn should_find_series_peak() {
        assert_eq!(max_of_series(&[1., 7.5, 3.]), 7.5);
        assert_eq!(max_of_series(&[]), 0.);
    }
}
