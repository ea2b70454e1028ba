// Uniform-lifetime divisors for mandatory distributions, ages 72-95.
static LIFE_EXPECTANCY_DIVISORS: &[(u32, f64)] = &[
    (72, 27.4),
    (73, 26.5),
    (74, 25.5),
    (75, 24.6),
    (76, 23.7),
    (77, 22.9),
    (78, 22.0),
    (79, 21.1),
    (80, 20.2),
    (81, 19.4),
    (82, 18.5),
    (83, 17.7),
    (84, 16.8),
    (85, 16.0),
    (86, 15.2),
    (87, 14.4),
    (88, 13.7),
    (89, 12.9),
    (90, 12.2),
    (91, 11.5),
    (92, 10.8),
    (93, 10.1),
    (94, 9.5),
    (95, 8.9),
];

// Benefit multiplier by claiming age; 67 is the unreduced reference age.
static CLAIMING_ADJUSTMENTS: &[(u32, f64)] = &[
    (62, 0.70),
    (63, 0.75),
    (64, 0.80),
    (65, 0.867),
    (66, 0.933),
    (67, 1.00),
    (68, 1.08),
    (69, 1.16),
    (70, 1.24),
];

pub fn distribution_start_age(birth_year: i32) -> u32 {
    if birth_year + 73 >= 2033 { 75 } else { 73 }
}

pub fn required_distribution(age: u32, traditional_balance: f64, birth_year: i32) -> f64 {
    if age < distribution_start_age(birth_year) {
        return 0.0;
    }

    match divisor_for_age(age) {
        Some(divisor) => traditional_balance / divisor,
        None => 0.0,
    }
}

fn divisor_for_age(age: u32) -> Option<f64> {
    LIFE_EXPECTANCY_DIVISORS
        .iter()
        .find(|(entry_age, _)| *entry_age == age)
        .map(|(_, divisor)| *divisor)
}

pub fn claiming_adjustment(claiming_age: u32) -> f64 {
    CLAIMING_ADJUSTMENTS
        .iter()
        .find(|(age, _)| *age == claiming_age)
        .map(|(_, factor)| *factor)
        .unwrap_or(1.0)
}

pub fn benefit_income(benefit_base: f64, claiming_age: u32, age: u32) -> f64 {
    if age < claiming_age {
        return 0.0;
    }
    benefit_base * claiming_adjustment(claiming_age)
}
