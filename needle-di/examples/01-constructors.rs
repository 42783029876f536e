// note: this example assumes you've analyzed the previous one

use needle_di::injector::InjectorBuilder;
use needle_di::instance::{InstancePtr, TypedInstanceProvider};
use needle_di::scope::TaskToken;
use needle_di::injectable;
use thiserror::Error;

#[derive(Error, Debug)]
#[error("invalid connection string")]
struct InvalidConnectionString;

struct Database {
    url: String,
}

// "singleton" scope means there's only one instance per injector
#[injectable(scope = "singleton")]
impl Database {
    // constructors can fail - the error is reported as ResolutionError::ConstructionFailed
    fn new() -> Result<Self, InvalidConnectionString> {
        Ok(Self {
            url: "postgres://localhost".to_string(),
        })
    }
}

struct Repository {
    database: Option<InstancePtr<Database>>,
    page_size: usize,
}

#[injectable]
impl Repository {
    // a type can have many constructors; #[default_constructor] marks the preferred one
    // #[ignore] parameters are not resolved, but get Default::default()
    #[default_constructor]
    fn new(database: InstancePtr<Database>, #[ignore] page_size: usize) -> Self {
        Self {
            database: Some(database),
            page_size: page_size.max(10),
        }
    }

    // without the marker above, the injector would pick this one, since it has no parameters
    fn detached() -> Self {
        Self {
            database: None,
            page_size: 10,
        }
    }

    fn describe(&self) {
        match &self.database {
            Some(database) => println!("Using {} with {} rows per page", database.url, self.page_size),
            None => println!("Detached"),
        }
    }
}

struct Report {
    title: String,
    repository: Option<InstancePtr<Repository>>,
}

// constructor = "..." always wins, regardless of other markers
#[injectable(constructor = "titled")]
impl Report {
    fn titled() -> Self {
        Self {
            title: "Monthly".to_string(),
            repository: None,
        }
    }

    // #[inject] methods are called after construction, with resolved parameters
    #[inject]
    fn set_repository(&mut self, repository: InstancePtr<Repository>) {
        self.repository = Some(repository);
    }
}

fn main() {
    let injector = InjectorBuilder::new()
        .build()
        .expect("error building Injector");

    let report = injector
        .instance_typed::<Report>(TaskToken::ROOT)
        .expect("error creating Report");

    // prints "Monthly" and "Using postgres://localhost with 10 rows per page"
    println!("{}", report.title);
    if let Some(repository) = &report.repository {
        repository.describe();
    }
}
