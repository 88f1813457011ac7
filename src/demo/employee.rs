use std::sync::Arc;

use chrono::Utc;
use serde::{Deserialize, Serialize};

use crate::error::RegistryError;
use crate::resolver::{ResolverContext, ResolverResult, sync_resolver};
use crate::schema_registry::SchemaRegistry;
use crate::types::{FieldDescriptor, TypeDescriptor};
use crate::value::Resolved;

use super::auth;
use super::product::{User, UserRole};
use super::store::{Identified, Store};

/// An employee of either kind. The role decides the concrete GraphQL type
/// and is serialized as the `__typename` discriminator.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Employee {
    pub id: i64,
    pub name: String,
    pub email: String,
    pub salary: f64,
    pub hire_date: String,
    #[serde(flatten)]
    pub role: Role,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(tag = "__typename")]
pub enum Role {
    #[serde(rename_all = "camelCase")]
    Developer {
        programming_languages: Vec<String>,
        github_username: Option<String>,
    },
    #[serde(rename_all = "camelCase")]
    Manager { department: String, team_size: i64 },
}

impl Identified for Employee {
    fn id(&self) -> i64 {
        self.id
    }
}

impl Employee {
    pub fn is_developer(&self) -> bool {
        matches!(self.role, Role::Developer { .. })
    }

    fn team_size(&self) -> usize {
        match self.role {
            Role::Manager { team_size, .. } => usize::try_from(team_size).unwrap_or(0),
            Role::Developer { .. } => 0,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
enum EmployeeType {
    Developer,
    Manager,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct EmployeeInput {
    name: String,
    email: String,
    salary: f64,
    #[serde(rename = "type")]
    kind: EmployeeType,
    #[serde(default)]
    programming_languages: Option<Vec<String>>,
    #[serde(default)]
    github_username: Option<String>,
    #[serde(default)]
    department: Option<String>,
}

#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct PersonalInfo {
    salary: f64,
    email: String,
    phone_number: String,
    address: String,
}

pub(super) fn seed() -> Vec<Employee> {
    vec![
        Employee {
            id: 1,
            name: "John Doe".to_string(),
            email: "john@example.com".to_string(),
            salary: 120000.0,
            hire_date: "2020-01-15".to_string(),
            role: Role::Developer {
                programming_languages: vec!["Go".into(), "Python".into(), "JavaScript".into()],
                github_username: Some("johndoe".to_string()),
            },
        },
        Employee {
            id: 2,
            name: "Jane Smith".to_string(),
            email: "jane@example.com".to_string(),
            salary: 150000.0,
            hire_date: "2019-06-01".to_string(),
            role: Role::Manager {
                department: "Engineering".to_string(),
                team_size: 5,
            },
        },
        Employee {
            id: 3,
            name: "Bob Wilson".to_string(),
            email: "bob@example.com".to_string(),
            salary: 110000.0,
            hire_date: "2021-03-20".to_string(),
            role: Role::Developer {
                programming_languages: vec!["Go".into(), "Rust".into()],
                github_username: None,
            },
        },
    ]
}

/// Fields every employee type carries.
fn shared_fields(descriptor: TypeDescriptor, users: &Arc<Store<User>>) -> TypeDescriptor {
    let users = users.clone();
    descriptor
        .field(FieldDescriptor::new("id", "Int!"))
        .field(FieldDescriptor::new("name", "String!"))
        .field(FieldDescriptor::new("email", "String!"))
        .field(FieldDescriptor::new("salary", "Float!"))
        .field(FieldDescriptor::new("hireDate", "String!"))
        .field(
            FieldDescriptor::new("personalDetails", "PersonalInfo")
                .description("Visible to admins and to the employee themselves")
                .resolve(sync_resolver(move |ctx| personal_details(&ctx, &users))),
        )
}

fn personal_details(ctx: &ResolverContext, users: &Store<User>) -> ResolverResult {
    let employee = ctx.parent_as::<Employee>()?;
    let user = auth::current_user(ctx, users)
        .ok_or("authentication required to view personal details")?;
    if user.role != UserRole::Admin && user.email != employee.email {
        return Err("not authorized to view personal details".into());
    }
    Resolved::object(PersonalInfo {
        salary: employee.salary,
        email: employee.email.clone(),
        phone_number: "+1-555-0123".to_string(),
        address: "123 Main St, Anytown, USA".to_string(),
    })
}

pub(super) fn register(
    registry: &mut SchemaRegistry,
    employees: Arc<Store<Employee>>,
    users: Arc<Store<User>>,
) -> Result<(), RegistryError> {
    registry.register_type(
        TypeDescriptor::object("PersonalInfo")
            .field(FieldDescriptor::new("salary", "Float!"))
            .field(FieldDescriptor::new("email", "String!"))
            .field(FieldDescriptor::new("phoneNumber", "String!"))
            .field(FieldDescriptor::new("address", "String!")),
    )?;
    registry.register_type(shared_fields(TypeDescriptor::interface("Employee"), &users))?;
    registry.register_type(
        shared_fields(TypeDescriptor::object("Developer"), &users)
            .implements("Employee")
            .field(FieldDescriptor::new("programmingLanguages", "[String!]!"))
            .field(FieldDescriptor::new("githubUsername", "String")),
    )?;

    let store = employees.clone();
    registry.register_type(
        shared_fields(TypeDescriptor::object("Manager"), &users)
            .implements("Employee")
            .field(FieldDescriptor::new("department", "String!"))
            .field(FieldDescriptor::new("teamSize", "Int!"))
            .field(
                FieldDescriptor::new("reports", "[Employee!]!").resolve(sync_resolver(
                    move |ctx| {
                        let manager = ctx.parent_as::<Employee>()?;
                        let mut developers = store.filter(Employee::is_developer);
                        developers.truncate(manager.team_size());
                        Resolved::objects(developers)
                    },
                )),
            ),
    )?;
    registry.register_type(TypeDescriptor::union("EmployeeResult", ["Developer", "Manager"]))?;
    registry.register_type(TypeDescriptor::enumeration(
        "EmployeeType",
        ["DEVELOPER", "MANAGER"],
    ))?;
    registry.register_type(
        TypeDescriptor::input_object("EmployeeInput")
            .input_field("name", "String!")
            .input_field("email", "String!")
            .input_field("salary", "Float!")
            .input_field("type", "EmployeeType!")
            .input_field("programmingLanguages", "[String!]")
            .input_field("githubUsername", "String")
            .input_field("department", "String"),
    )?;

    let store = employees.clone();
    registry.register_query(
        FieldDescriptor::new("employee", "Employee").param("id", "Int!"),
        sync_resolver(move |ctx| {
            let id: i64 = ctx.arg("id")?;
            let employee = store
                .get(id)
                .ok_or_else(|| format!("employee with id {id} not found"))?;
            Resolved::object(employee)
        }),
    )?;

    let store = employees.clone();
    registry.register_query(
        FieldDescriptor::new("employees", "[Employee!]!"),
        sync_resolver(move |_| Resolved::objects(store.list())),
    )?;

    let store = employees.clone();
    registry.register_query(
        FieldDescriptor::new("managers", "[Manager!]!"),
        sync_resolver(move |_| Resolved::objects(store.filter(|e| !e.is_developer()))),
    )?;

    let store = employees.clone();
    registry.register_mutation(
        FieldDescriptor::new("createEmployee", "EmployeeResult!").param("input", "EmployeeInput!"),
        sync_resolver(move |ctx| {
            let input: EmployeeInput = ctx.arg("input")?;
            let role = match input.kind {
                EmployeeType::Developer => {
                    let languages = input.programming_languages.unwrap_or_default();
                    if languages.is_empty() {
                        return Err(
                            "developers must have at least one programming language".into()
                        );
                    }
                    Role::Developer {
                        programming_languages: languages,
                        github_username: input.github_username,
                    }
                }
                EmployeeType::Manager => match input.department {
                    Some(department) if !department.is_empty() => Role::Manager {
                        department,
                        team_size: 0,
                    },
                    _ => return Err("managers must have a department".into()),
                },
            };
            let employee = store.insert_with(|id| Employee {
                id,
                name: input.name,
                email: input.email,
                salary: input.salary,
                hire_date: Utc::now().format("%Y-%m-%d").to_string(),
                role,
            });
            tracing::info!(employee = employee.id, "employee created");
            Resolved::object(employee)
        }),
    )?;

    let store = employees;
    registry.register_mutation(
        FieldDescriptor::new("promoteToManager", "Manager!")
            .param("employeeId", "Int!")
            .param("department", "String!"),
        sync_resolver(move |ctx| {
            let id: i64 = ctx.arg("employeeId")?;
            let department: String = ctx.arg("department")?;
            let mut promoted = false;
            let employee = store.update(id, |employee| {
                if employee.is_developer() {
                    employee.role = Role::Manager {
                        department,
                        team_size: 0,
                    };
                    employee.salary *= 1.2;
                    promoted = true;
                }
            });
            match employee {
                Some(manager) if promoted => Resolved::object(manager),
                _ => Err(format!("developer with id {id} not found").into()),
            }
        }),
    )?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    #[test]
    fn roles_serialize_as_discriminated_variants() {
        let employees = seed();
        let value = serde_json::to_value(&employees[1]).unwrap();
        assert_eq!(
            value,
            json!({
                "id": 2,
                "name": "Jane Smith",
                "email": "jane@example.com",
                "salary": 150000.0,
                "hireDate": "2019-06-01",
                "__typename": "Manager",
                "department": "Engineering",
                "teamSize": 5
            })
        );
        let developer = serde_json::to_value(&employees[2]).unwrap();
        assert_eq!(developer["__typename"], json!("Developer"));
        assert_eq!(developer["githubUsername"], json!(null));
    }

    #[test]
    fn developers_have_no_reports() {
        let employees = seed();
        assert_eq!(employees[0].team_size(), 0);
        assert_eq!(employees[1].team_size(), 5);
    }
}
